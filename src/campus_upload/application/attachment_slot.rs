use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use super::error::ApplicationError;
use super::upload_service::UploadService;
use crate::config::FormLimits;
use crate::domain::error::NormalizeError;
use crate::domain::image::{NormalizedImage, UploadedImage};
use crate::infrastructure::error::InfrastructureError;

struct SlotState {
    generation: u64,
    in_flight: Option<AbortHandle>,
    value: Option<NormalizedImage>,
    touched: Instant,
}

impl Default for SlotState {
    fn default() -> Self {
        Self {
            generation: 0,
            in_flight: None,
            value: None,
            touched: Instant::now(),
        }
    }
}

/// One image field of a form.
///
/// At most one normalization is in flight per slot. Selecting a new file aborts
/// the previous one, and only the newest selection may write the slot, so a
/// slow earlier pipeline can never overwrite a later one. The write happens in
/// the spawned task, so a caller that goes away does not lose the result.
#[derive(Default)]
pub struct AttachmentSlot {
    state: Mutex<SlotState>,
}

impl AttachmentSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn replace(
        self: &Arc<Self>,
        service: Arc<UploadService>,
        upload: UploadedImage,
    ) -> Result<NormalizedImage, ApplicationError> {
        // ロック中に spawn するので、タスク側の settle は in_flight の登録後に走る
        let task = {
            let mut state = self.lock();
            state.generation += 1;
            state.touched = Instant::now();
            let ticket = state.generation;

            let slot = Arc::clone(self);
            let task = tokio::spawn(async move {
                let result = service.accept(upload).await;
                let outcome = slot.settle(ticket, result);
                drop(slot);
                outcome
            });

            if let Some(previous) = state.in_flight.replace(task.abort_handle()) {
                debug!("Aborting in-flight normalization (generation {})", ticket - 1);
                previous.abort();
            }
            task
        };

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => Err(NormalizeError::Superseded.into()),
            Err(e) => Err(InfrastructureError::TaskJoinError(e.to_string()).into()),
        }
    }

    fn settle(
        &self,
        ticket: u64,
        result: Result<NormalizedImage, ApplicationError>,
    ) -> Result<NormalizedImage, ApplicationError> {
        let mut state = self.lock();
        if state.generation != ticket {
            return Err(NormalizeError::Superseded.into());
        }
        state.in_flight = None;
        state.touched = Instant::now();

        // 失敗した場合は以前の画像をそのまま残す
        let normalized = result?;
        state.value = Some(normalized.clone());
        Ok(normalized)
    }

    pub fn current(&self) -> Option<NormalizedImage> {
        self.lock().value.clone()
    }

    /// No image held and nothing in flight.
    pub fn is_empty(&self) -> bool {
        let state = self.lock();
        state.value.is_none() && state.in_flight.is_none()
    }

    fn idle_since(&self) -> Option<Instant> {
        let state = self.lock();
        state.in_flight.is_none().then_some(state.touched)
    }

    /// Form submitted or discarded: drop the held image and any pending selection.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.generation += 1;
        if let Some(previous) = state.in_flight.take() {
            previous.abort();
        }
        state.value = None;
        state.touched = Instant::now();
    }
}

/// Attachment slots keyed by form id, bounded in count and idle time.
pub struct FormRegistry {
    slots: Mutex<HashMap<String, Arc<AttachmentSlot>>>,
    limits: FormLimits,
}

impl Default for FormRegistry {
    fn default() -> Self {
        Self::new(FormLimits::default())
    }
}

impl FormRegistry {
    pub fn new(limits: FormLimits) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            limits,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<AttachmentSlot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // 参照がマップだけ (strong_count == 1) のスロットは誰も使っていない
    fn unused(slot: &Arc<AttachmentSlot>) -> bool {
        Arc::strong_count(slot) == 1
    }

    pub fn slot(&self, form_id: &str) -> Result<Arc<AttachmentSlot>, InfrastructureError> {
        let mut slots = self.lock();
        if let Some(slot) = slots.get(form_id) {
            return Ok(Arc::clone(slot));
        }

        let now = Instant::now();
        let before = slots.len();
        slots.retain(|_, slot| {
            !(Self::unused(slot)
                && slot
                    .idle_since()
                    .map_or(false, |since| now.duration_since(since) >= self.limits.idle_ttl))
        });
        if slots.len() < before {
            info!("Evicted {} idle form attachment(s)", before - slots.len());
        }

        if slots.len() >= self.limits.max_forms {
            let oldest = slots
                .iter()
                .filter(|(_, slot)| Self::unused(slot))
                .filter_map(|(id, slot)| slot.idle_since().map(|since| (since, id.clone())))
                .min();
            match oldest {
                Some((_, id)) => {
                    debug!("Evicting least recently used form {}", id);
                    slots.remove(&id);
                }
                None => return Err(InfrastructureError::TooManyForms(self.limits.max_forms)),
            }
        }

        let slot = Arc::new(AttachmentSlot::new());
        slots.insert(form_id.to_string(), Arc::clone(&slot));
        Ok(slot)
    }

    pub fn get(&self, form_id: &str) -> Option<Arc<AttachmentSlot>> {
        self.lock().get(form_id).cloned()
    }

    /// Drops the entry if nobody else holds it and it carries no image.
    pub fn prune(&self, form_id: &str) {
        let mut slots = self.lock();
        let empty = slots
            .get(form_id)
            .map_or(false, |slot| Self::unused(slot) && slot.is_empty());
        if empty {
            slots.remove(form_id);
        }
    }

    pub fn discard(&self, form_id: &str) {
        if let Some(slot) = self.lock().remove(form_id) {
            slot.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NormalizerConfig;
    use crate::domain::normalizer_trait::MockImageNormalizer;
    use std::time::Duration;

    // 先頭バイトが 1 の入力は遅く、それ以外は即座に返すモック
    fn slow_first_service() -> Arc<UploadService> {
        let mut mock = MockImageNormalizer::new();
        mock.expect_normalize().returning(|upload| {
            if upload.bytes[0] == 1 {
                std::thread::sleep(Duration::from_millis(300));
                Ok(NormalizedImage::new("c2xvdw==".to_string(), 1, 1))
            } else {
                Ok(NormalizedImage::new("ZmFzdA==".to_string(), 2, 2))
            }
        });
        Arc::new(UploadService::new(Arc::new(mock), &NormalizerConfig::default()))
    }

    #[tokio::test]
    async fn test_replace_stores_latest_result() {
        let slot = Arc::new(AttachmentSlot::new());
        let service = slow_first_service();

        let output = slot.replace(service, UploadedImage::new(vec![2], None)).await.unwrap();
        assert_eq!(output.base64, "ZmFzdA==");
        assert_eq!(slot.current(), Some(output));
    }

    #[tokio::test]
    async fn test_newer_selection_supersedes_slow_one() {
        let slot = Arc::new(AttachmentSlot::new());
        let service = slow_first_service();

        let first = {
            let slot = Arc::clone(&slot);
            let service = Arc::clone(&service);
            tokio::spawn(async move { slot.replace(service, UploadedImage::new(vec![1], None)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = slot.replace(service, UploadedImage::new(vec![2], None)).await.unwrap();
        assert_eq!(second.base64, "ZmFzdA==");

        let first = first.await.unwrap();
        assert!(matches!(first, Err(ApplicationError::Normalize(NormalizeError::Superseded))));
        assert_eq!(slot.current().map(|image| image.base64), Some("ZmFzdA==".to_string()));
    }

    #[tokio::test]
    async fn test_failed_selection_keeps_previous_image() {
        let mut mock = MockImageNormalizer::new();
        mock.expect_normalize().returning(|upload| {
            if upload.bytes[0] == 0 {
                Err(NormalizeError::DecodeFailed("corrupt".to_string()))
            } else {
                Ok(NormalizedImage::new("b2s=".to_string(), 1, 1))
            }
        });
        let service = Arc::new(UploadService::new(Arc::new(mock), &NormalizerConfig::default()));
        let slot = Arc::new(AttachmentSlot::new());

        slot.replace(Arc::clone(&service), UploadedImage::new(vec![1], None)).await.unwrap();
        let result = slot.replace(service, UploadedImage::new(vec![0], None)).await;

        assert!(matches!(result, Err(ApplicationError::Normalize(NormalizeError::DecodeFailed(_)))));
        assert_eq!(slot.current().map(|image| image.base64), Some("b2s=".to_string()));
    }

    #[tokio::test]
    async fn test_clear_discards_image() {
        let slot = Arc::new(AttachmentSlot::new());
        slot.replace(slow_first_service(), UploadedImage::new(vec![2], None)).await.unwrap();

        slot.clear();
        assert_eq!(slot.current(), None);
    }

    #[tokio::test]
    async fn test_result_lands_even_if_caller_goes_away() {
        let slot = Arc::new(AttachmentSlot::new());
        let service = slow_first_service();

        let caller = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.replace(service, UploadedImage::new(vec![1], None)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(slot.current().map(|image| image.base64), Some("c2xvdw==".to_string()));
        assert!(!slot.is_empty());
    }

    fn limits(max_forms: usize, idle_ttl: Duration) -> FormLimits {
        FormLimits { max_forms, idle_ttl }
    }

    #[test]
    fn test_registry_reuses_slot_per_form() {
        let registry = FormRegistry::default();
        let a = registry.slot("complaint-1").unwrap();
        let b = registry.slot("complaint-1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.get("lost-found-1").is_none());

        registry.discard("complaint-1");
        assert!(registry.get("complaint-1").is_none());
    }

    #[test]
    fn test_prune_removes_only_unused_empty_slots() {
        let registry = FormRegistry::default();
        let held = registry.slot("complaint-1").unwrap();

        registry.prune("complaint-1");
        assert_eq!(registry.len(), 1, "slot still referenced by a request");

        drop(held);
        registry.prune("complaint-1");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_slot_with_image() {
        let registry = FormRegistry::default();
        let slot = registry.slot("complaint-1").unwrap();
        slot.replace(slow_first_service(), UploadedImage::new(vec![2], None)).await.unwrap();
        drop(slot);

        registry.prune("complaint-1");
        assert!(registry.get("complaint-1").is_some());
    }

    #[test]
    fn test_idle_slots_are_evicted() {
        let registry = FormRegistry::new(limits(16, Duration::ZERO));
        drop(registry.slot("old").unwrap());

        let _fresh = registry.slot("new").unwrap();
        assert!(registry.get("old").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest_unused_slot() {
        let registry = FormRegistry::new(limits(2, Duration::from_secs(3600)));
        drop(registry.slot("first").unwrap());
        std::thread::sleep(Duration::from_millis(5));
        drop(registry.slot("second").unwrap());

        let _third = registry.slot("third").unwrap();
        assert!(registry.get("first").is_none());
        assert!(registry.get("second").is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_capacity_full_of_busy_slots_is_an_error() {
        let registry = FormRegistry::new(limits(1, Duration::from_secs(3600)));
        let _busy = registry.slot("first").unwrap();

        let result = registry.slot("second");
        assert!(matches!(result, Err(InfrastructureError::TooManyForms(1))));
    }
}
