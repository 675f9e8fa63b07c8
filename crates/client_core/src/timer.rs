use std::{future::Future, sync::Mutex};

use tokio::{runtime::Handle, task::JoinHandle};

/// Cancellable background task owned by a controller.
///
/// At most one task is armed at a time; arming again aborts the previous one,
/// and dropping the owner aborts whatever is still pending. Tasks run on the
/// runtime that was current at construction, so `arm` may be called from
/// threads outside it.
#[derive(Default)]
pub struct DelayedTask {
    handle: Mutex<Option<JoinHandle<()>>>,
    runtime: Option<Handle>,
}

impl DelayedTask {
    pub fn new() -> Self {
        Self::on(Handle::try_current().ok())
    }

    pub fn on(runtime: Option<Handle>) -> Self {
        Self {
            handle: Mutex::new(None),
            runtime,
        }
    }

    /// Returns `false` when no runtime is available and nothing was armed.
    pub fn arm<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let Some(runtime) = runtime_handle(self.runtime.as_ref()) else {
            tracing::warn!("no tokio runtime available; delayed task not armed");
            return false;
        };
        *slot = Some(runtime.spawn(task));
        true
    }

    pub fn cancel(&self) {
        if let Some(handle) = self.slot().take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The captured runtime, else whichever one the caller is running on.
pub(crate) fn runtime_handle(captured: Option<&Handle>) -> Option<Handle> {
    captured.cloned().or_else(|| Handle::try_current().ok())
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
