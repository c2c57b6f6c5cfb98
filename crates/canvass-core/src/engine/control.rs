use crate::errors::EngineError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::{timeout, Duration};

/// Per-run control flags shared between the engine and its caller. The
/// engine reads them at batch boundaries only; an in-flight batch always
/// finishes before a pause or cancel takes effect.
#[derive(Default)]
pub struct RunControl {
    paused: AtomicBool,
    cancelled: AtomicBool,
    wake: Notify,
}

impl RunControl {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for a resume/cancel notify, bounded so a missed notify can never
    /// wedge a paused run past `bound`.
    pub async fn wait_for_wake(&self, bound: Duration) {
        let _ = timeout(bound, self.wake.notified()).await;
    }
}

/// Active-run registry keyed by survey id. Registering an id twice fails
/// `AlreadyRunning`; each survey has exactly one engine instance at a time,
/// while different surveys run fully in parallel.
#[derive(Clone, Default)]
pub struct ControlRegistry {
    inner: Arc<Mutex<HashMap<i64, Arc<RunControl>>>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, survey_id: i64) -> Result<Arc<RunControl>, EngineError> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(&survey_id) {
            return Err(EngineError::AlreadyRunning(survey_id));
        }
        let control = Arc::new(RunControl::default());
        map.insert(survey_id, control.clone());
        Ok(control)
    }

    pub fn remove(&self, survey_id: i64) {
        self.inner.lock().unwrap().remove(&survey_id);
    }

    pub fn get(&self, survey_id: i64) -> Option<Arc<RunControl>> {
        self.inner.lock().unwrap().get(&survey_id).cloned()
    }

    /// Flag flips return false when no run is active for the id.
    pub fn pause(&self, survey_id: i64) -> bool {
        match self.get(survey_id) {
            Some(c) => {
                c.pause();
                true
            }
            None => false,
        }
    }

    pub fn resume(&self, survey_id: i64) -> bool {
        match self.get(survey_id) {
            Some(c) => {
                c.resume();
                true
            }
            None => false,
        }
    }

    pub fn cancel(&self, survey_id: i64) -> bool {
        match self.get(survey_id) {
            Some(c) => {
                c.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_register_is_already_running() {
        let reg = ControlRegistry::new();
        let _c = reg.register(7).unwrap();
        assert!(matches!(
            reg.register(7),
            Err(EngineError::AlreadyRunning(7))
        ));
        reg.remove(7);
        assert!(reg.register(7).is_ok());
    }

    #[test]
    fn flips_on_missing_run_return_false() {
        let reg = ControlRegistry::new();
        assert!(!reg.pause(1));
        assert!(!reg.resume(1));
        assert!(!reg.cancel(1));
    }

    #[tokio::test]
    async fn bounded_wait_returns_without_notify() {
        let c = RunControl::default();
        c.pause();
        // No resume ever arrives; the wait must still come back.
        c.wait_for_wake(Duration::from_millis(10)).await;
        assert!(c.is_paused());
    }

    #[tokio::test]
    async fn resume_wakes_a_waiter() {
        let c = Arc::new(RunControl::default());
        c.pause();
        let waiter = c.clone();
        let h = tokio::spawn(async move {
            while waiter.is_paused() {
                waiter.wait_for_wake(Duration::from_secs(5)).await;
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        c.resume();
        h.await.unwrap();
    }
}
