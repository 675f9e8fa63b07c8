use crate::session::SessionContext;

pub const HOME_PATH: &str = "/";
pub const SIGN_IN_PATH: &str = "/sign-in";
pub const LSK_RESOLVE_PATH: &str = "/lsk-resolve";
pub const GITHUB_CONNECT_PATH: &str = "/github-connect";
pub const LOGOUT_PATH: &str = "/logout";

/// Section rendered inside the authenticated shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    LskResolver,
    GithubConnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    SignIn,
    Home(Option<Section>),
    /// Sign out, then follow the guard to the sign-in page.
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Render(View),
    Redirect(&'static str),
}

/// Decides what a path shows, given only whether a session exists.
#[derive(Clone)]
pub struct RouteGuard {
    session: SessionContext,
}

impl RouteGuard {
    pub fn new(session: SessionContext) -> Self {
        Self { session }
    }

    pub fn decide(&self, path: &str) -> RouteDecision {
        decide_route(path, self.session.is_authenticated())
    }
}

pub fn decide_route(path: &str, authenticated: bool) -> RouteDecision {
    let path = normalize_path(path);
    let section = match path {
        SIGN_IN_PATH if authenticated => return RouteDecision::Redirect(HOME_PATH),
        SIGN_IN_PATH => return RouteDecision::Render(View::SignIn),
        LOGOUT_PATH if authenticated => return RouteDecision::Render(View::Logout),
        HOME_PATH => None,
        LSK_RESOLVE_PATH => Some(Section::LskResolver),
        GITHUB_CONNECT_PATH => Some(Section::GithubConnect),
        _ if authenticated => return RouteDecision::Redirect(HOME_PATH),
        _ => return RouteDecision::Redirect(SIGN_IN_PATH),
    };

    if authenticated {
        RouteDecision::Render(View::Home(section))
    } else {
        RouteDecision::Redirect(SIGN_IN_PATH)
    }
}

/// Drops query, fragment and trailing slashes.
pub(crate) fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    match path.trim_end_matches('/') {
        "" => HOME_PATH,
        trimmed => trimmed,
    }
}
