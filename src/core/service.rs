//! In-memory render service.
//!
//! Stands in for the external multimedia engine at the model boundary:
//! keeps the ordered attach list the stack projects into, and hands
//! snapshots to a render worker. Also counts attach/detach traffic so
//! tests can verify that reorders only churn the affected tail.

use std::sync::{Arc, RwLock};

use crate::entities::traits::{FilterInstance, RenderService, ServiceWeak};
use crate::error::{ModelError, ModelResult};

/// Ordered, append-only processing chain.
#[derive(Default)]
pub struct MemoryService {
    attached: Vec<Arc<FilterInstance>>,
    attach_ops: usize,
    detach_ops: usize,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, ready to be observed by model and renderer.
    pub fn new_ref() -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Non-owning handle for a stack. The stack treats an expired weak as
    /// `ServiceUnavailable`.
    pub fn weak(this: &Arc<RwLock<Self>>) -> ServiceWeak {
        let service: Arc<RwLock<dyn RenderService>> = this.clone();
        Arc::downgrade(&service)
    }

    /// Attach order as kind ids (test/debug convenience).
    pub fn attached_kinds(&self) -> Vec<String> {
        self.attached
            .iter()
            .map(|f| f.kind_id().to_string())
            .collect()
    }

    /// Read path for a render worker: clone the ordered chain under the
    /// shared lock, release, then process the snapshot.
    pub fn snapshot(&self) -> Vec<Arc<FilterInstance>> {
        self.attached.clone()
    }

    /// (attach, detach) call counts since the last reset.
    pub fn ops(&self) -> (usize, usize) {
        (self.attach_ops, self.detach_ops)
    }

    pub fn reset_ops(&mut self) {
        self.attach_ops = 0;
        self.detach_ops = 0;
    }
}

impl RenderService for MemoryService {
    fn attach(&mut self, filter: Arc<FilterInstance>) -> ModelResult<()> {
        self.attach_ops += 1;
        self.attached.push(filter);
        Ok(())
    }

    fn detach(&mut self, filter: &FilterInstance) -> ModelResult<()> {
        self.detach_ops += 1;
        let pos = self
            .attached
            .iter()
            .position(|f| std::ptr::eq(f.as_ref(), filter));
        match pos {
            Some(pos) => {
                self.attached.remove(pos);
                Ok(())
            }
            None => {
                log::warn!("detach of a filter that is not attached ({})", filter.kind_id());
                Err(ModelError::InvalidArgument(
                    "filter is not attached to this service".into(),
                ))
            }
        }
    }

    fn filter_count(&self) -> usize {
        self.attached.len()
    }

    fn attached(&self) -> Vec<Arc<FilterInstance>> {
        self.attached.clone()
    }
}

/// Keep-alive wrapper: owns the strong reference the stacks' weak handles
/// point at. Dropping it expires every handle, which is how an engine
/// teardown looks from the model's side.
pub struct ServiceHandle {
    service: Arc<RwLock<MemoryService>>,
}

impl ServiceHandle {
    pub fn new() -> Self {
        Self {
            service: MemoryService::new_ref(),
        }
    }

    pub fn weak(&self) -> ServiceWeak {
        MemoryService::weak(&self.service)
    }

    pub fn service(&self) -> &Arc<RwLock<MemoryService>> {
        &self.service
    }
}

impl Default for ServiceHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::attrs::Attrs;

    fn filter(kind: &str) -> Arc<FilterInstance> {
        FilterInstance::new(kind, Attrs::new())
    }

    #[test]
    fn test_attach_appends_detach_removes_anywhere() {
        let mut svc = MemoryService::new();
        let a = filter("a");
        let b = filter("b");
        let c = filter("c");
        svc.attach(Arc::clone(&a)).unwrap();
        svc.attach(Arc::clone(&b)).unwrap();
        svc.attach(Arc::clone(&c)).unwrap();
        assert_eq!(svc.attached_kinds(), vec!["a", "b", "c"]);

        // middle removal
        svc.detach(&b).unwrap();
        assert_eq!(svc.attached_kinds(), vec!["a", "c"]);

        // re-attach only ever appends
        svc.attach(Arc::clone(&b)).unwrap();
        assert_eq!(svc.attached_kinds(), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_detach_miss_is_an_error() {
        let mut svc = MemoryService::new();
        let ghost = filter("ghost");
        assert!(svc.detach(&ghost).is_err());
    }

    #[test]
    fn test_weak_expires_with_handle() {
        let handle = ServiceHandle::new();
        let weak = handle.weak();
        assert!(weak.upgrade().is_some());
        drop(handle);
        assert!(weak.upgrade().is_none());
    }
}
