use crate::{
    auth::{AuthController, SignedOut},
    routes::{
        normalize_path, RouteDecision, RouteGuard, View, GITHUB_CONNECT_PATH, LOGOUT_PATH,
        LSK_RESOLVE_PATH,
    },
};

pub const BRAND: &str = "Catalyst";
pub const LOGOUT_LABEL: &str = "Logout";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    pub label: &'static str,
    pub path: &'static str,
    pub active: bool,
}

const SECTIONS: [(&str, &str); 2] = [
    ("LSK Resolver", LSK_RESOLVE_PATH),
    ("GitHub Connect", GITHUB_CONNECT_PATH),
];

/// Persistent chrome around every authenticated view.
#[derive(Clone)]
pub struct NavigationShell {
    auth: AuthController,
}

impl NavigationShell {
    pub fn new(auth: AuthController) -> Self {
        Self { auth }
    }

    pub fn brand(&self) -> &'static str {
        BRAND
    }

    pub fn entries(&self, current_path: &str) -> Vec<NavEntry> {
        let current = normalize_path(current_path);
        SECTIONS
            .iter()
            .map(|&(label, path)| NavEntry {
                label,
                path,
                active: current == path,
            })
            .collect()
    }

    pub fn logout_entry(&self) -> NavEntry {
        NavEntry {
            label: LOGOUT_LABEL,
            path: LOGOUT_PATH,
            active: false,
        }
    }

    pub fn identity_label(&self) -> Option<String> {
        self.auth
            .session()
            .identity()
            .filter(|identity| !identity.is_empty())
            .map(|identity| format!("Signed in as {identity}"))
    }

    pub async fn sign_out(&self) -> SignedOut {
        self.auth.sign_out().await
    }

    /// Resolves a path through the guard. The logout view is answered here by
    /// signing out and redirecting to sign-in.
    pub async fn navigate(&self, path: &str) -> RouteDecision {
        match RouteGuard::new(self.auth.session().clone()).decide(path) {
            RouteDecision::Render(View::Logout) => {
                RouteDecision::Redirect(self.sign_out().await.redirect_to)
            }
            decision => decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use shared::{domain::Session, protocol::SignInRequest};

    use super::*;
    use crate::{
        api::{ApiReply, BackendApi, ResolveRequest, TransportError},
        session::{MemorySessionStorage, SessionContext},
    };

    struct OfflineBackend;

    #[async_trait]
    impl BackendApi for OfflineBackend {
        async fn sign_in(&self, _: &SignInRequest) -> Result<ApiReply, TransportError> {
            Err(TransportError::NoResponse("offline".into()))
        }

        async fn sign_out(&self, _: Option<&str>) -> Result<ApiReply, TransportError> {
            Err(TransportError::NoResponse("offline".into()))
        }

        async fn resolve(
            &self,
            _: Option<&str>,
            _: ResolveRequest,
        ) -> Result<ApiReply, TransportError> {
            Err(TransportError::NoResponse("offline".into()))
        }
    }

    async fn shell() -> NavigationShell {
        let storage = Arc::new(MemorySessionStorage::with_session(&Session::new(
            "ada@example.com",
            "tok-1",
        )));
        let session = SessionContext::restore(storage).await.expect("restore");
        NavigationShell::new(AuthController::new(Arc::new(OfflineBackend), session))
    }

    #[tokio::test]
    async fn marks_current_section_active() {
        let shell = shell().await;
        assert_eq!(shell.brand(), "Catalyst");

        let entries = shell.entries("/lsk-resolve");
        let labels: Vec<_> = entries.iter().map(|entry| entry.label).collect();
        assert_eq!(labels, ["LSK Resolver", "GitHub Connect"]);
        assert!(entries[0].active);
        assert!(!entries[1].active);

        assert!(shell.entries("/").iter().all(|entry| !entry.active));
        assert!(shell.entries("/lsk-resolve?tab=1")[0].active);
        assert!(shell.entries("/github-connect/#top")[1].active);
        assert_eq!(shell.logout_entry().path, "/logout");
    }

    #[tokio::test]
    async fn logout_clears_identity_banner() {
        let shell = shell().await;
        assert_eq!(
            shell.identity_label().as_deref(),
            Some("Signed in as ada@example.com")
        );

        let signed_out = shell.sign_out().await;

        assert_eq!(signed_out.redirect_to, "/sign-in");
        assert_eq!(shell.identity_label(), None);
    }

    #[tokio::test]
    async fn logout_entry_signs_out_and_lands_on_sign_in() {
        let shell = shell().await;
        assert_eq!(
            shell.navigate("/lsk-resolve").await,
            RouteDecision::Render(View::Home(Some(crate::routes::Section::LskResolver)))
        );

        let decision = shell.navigate(shell.logout_entry().path).await;

        assert_eq!(decision, RouteDecision::Redirect("/sign-in"));
        assert_eq!(shell.identity_label(), None);
        assert_eq!(
            shell.navigate("/lsk-resolve").await,
            RouteDecision::Redirect("/sign-in")
        );
    }
}
