use async_trait::async_trait;
use chatstore_binding::{BindingOptions, DataBinding, WriteAction};
use chatstore_data::{DataError, DataResult, DataSource, LocalSource, MemoryStore, SourceKind};
use chatstore_types::{Fields, Record};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Wallet {
    id: String,
    balance: i64,
}

impl Record for Wallet {
    fn id(&self) -> &str {
        &self.id
    }
}

fn wallet(id: &str, balance: i64) -> Wallet {
    Wallet {
        id: id.to_string(),
        balance,
    }
}

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

async fn local_with(records: &[Wallet]) -> Arc<dyn DataSource<Wallet>> {
    let local = LocalSource::new("wallet", Arc::new(MemoryStore::new()));
    local.replace_all(records).await.unwrap();
    Arc::new(local)
}

fn broken() -> Arc<dyn DataSource<Wallet>> {
    Arc::new(BrokenSource)
}

/// A source whose every operation fails.
struct BrokenSource;

#[async_trait]
impl DataSource<Wallet> for BrokenSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Remote
    }
    async fn get(&self, _id: &str) -> DataResult<Wallet> {
        Err(DataError::RemoteUnavailable("offline".to_string()))
    }
    async fn get_all(&self) -> DataResult<Vec<Wallet>> {
        Err(DataError::RemoteUnavailable("offline".to_string()))
    }
    async fn create(&self, _data: Fields) -> DataResult<Wallet> {
        Err(DataError::RemoteRejected("quota exceeded".to_string()))
    }
    async fn update(&self, _id: &str, _patch: Fields) -> DataResult<Wallet> {
        Err(DataError::RemoteRejected("read only".to_string()))
    }
    async fn delete(&self, _id: &str) -> DataResult<()> {
        Err(DataError::NotFound("w1".to_string()))
    }
}

/// A source that counts loads and can hold them until released.
#[derive(Default)]
struct GatedSource {
    loads: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl DataSource<Wallet> for GatedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Local
    }
    async fn get(&self, id: &str) -> DataResult<Wallet> {
        Err(DataError::NotFound(id.to_string()))
    }
    async fn get_all(&self) -> DataResult<Vec<Wallet>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let n = self.loads.fetch_add(1, Ordering::SeqCst) as i64;
        Ok(vec![wallet("w1", n)])
    }
    async fn create(&self, _data: Fields) -> DataResult<Wallet> {
        unimplemented!()
    }
    async fn update(&self, _id: &str, _patch: Fields) -> DataResult<Wallet> {
        unimplemented!()
    }
    async fn delete(&self, _id: &str) -> DataResult<()> {
        unimplemented!()
    }
}

// ── load ────────────────────────────────────────────────────────

#[tokio::test]
async fn load_replaces_sequence_wholesale() {
    let source = local_with(&[wallet("w1", 1), wallet("w2", 2)]).await;
    let binding = DataBinding::new("wallet", vec![wallet("stale", 0)], source);

    binding.load().await;

    assert_eq!(binding.get(), vec![wallet("w1", 1), wallet("w2", 2)]);
    assert!(!binding.loading().get());
    assert_eq!(binding.error().get(), None);
}

#[tokio::test]
async fn load_single_takes_first_record() {
    let source = local_with(&[wallet("w1", 1), wallet("w2", 2)]).await;
    let binding = DataBinding::new("wallet", None, source);

    binding.load().await;
    assert_eq!(binding.get(), Some(wallet("w1", 1)));
}

#[tokio::test]
async fn empty_load_keeps_single_value() {
    let source = local_with(&[]).await;
    let binding = DataBinding::new("wallet", Some(wallet("seed", 7)), source);

    binding.load().await;
    assert_eq!(binding.get(), Some(wallet("seed", 7)));
}

#[tokio::test]
async fn load_failure_is_recorded_not_returned() {
    let binding = DataBinding::new("wallet", Vec::<Wallet>::new(), broken());

    binding.load().await;

    assert!(binding.get().is_empty());
    assert!(!binding.loading().get());
    let message = binding.error().get().unwrap();
    assert!(message.contains("offline"));
}

#[tokio::test]
async fn next_action_clears_previous_error() {
    let binding = DataBinding::new("wallet", Vec::<Wallet>::new(), broken());
    binding.load().await;
    assert!(binding.error().get().is_some());

    // Even a failing action starts by clearing the old message.
    let mut errors = binding.error().subscribe();
    errors.borrow_and_update();
    binding.load().await;
    assert!(errors.has_changed().unwrap());
    assert!(binding.error().get().is_some());
}

#[tokio::test]
async fn loading_flag_is_set_while_in_flight() {
    let gate = Arc::new(Notify::new());
    let source = Arc::new(GatedSource {
        gate: Some(Arc::clone(&gate)),
        ..Default::default()
    });
    let source: Arc<dyn DataSource<Wallet>> = source;
    let binding = Arc::new(DataBinding::new("wallet", None, source));

    let task = {
        let binding = Arc::clone(&binding);
        tokio::spawn(async move { binding.load().await })
    };
    while !binding.loading().get() {
        tokio::task::yield_now().await;
    }

    gate.notify_one();
    task.await.unwrap();
    assert!(!binding.loading().get());
    assert_eq!(binding.get(), Some(wallet("w1", 0)));
}

// ── create / delete ─────────────────────────────────────────────

#[tokio::test]
async fn create_replaces_single_value() {
    let source = local_with(&[]).await;
    let binding = DataBinding::new("wallet", None, source.clone());

    let created = binding.create(fields(json!({ "balance": 50 }))).await.unwrap();

    assert_eq!(binding.get(), Some(created.clone()));
    assert_eq!(source.get(&created.id).await.unwrap(), created);
}

#[tokio::test]
async fn create_replaces_sequence_until_next_load() {
    let source = local_with(&[wallet("w1", 1)]).await;
    let binding = DataBinding::new("wallet", Vec::new(), source);
    binding.load().await;

    let created = binding.create(fields(json!({ "balance": 2 }))).await.unwrap();
    assert_eq!(binding.get(), vec![created.clone()]);

    binding.load().await;
    assert_eq!(binding.get(), vec![wallet("w1", 1), created]);
}

#[tokio::test]
async fn create_failure_is_recorded_and_returned() {
    let binding = DataBinding::new("wallet", None, broken());

    let err = binding.create(fields(json!({ "balance": 1 }))).await.unwrap_err();

    assert!(matches!(err, DataError::RemoteRejected(_)));
    assert_eq!(
        binding.error().get().as_deref(),
        Some("remote rejected request: quota exceeded")
    );
    assert_eq!(binding.get(), None);
    assert!(!binding.loading().get());
}

#[tokio::test]
async fn delete_resets_to_initial_value() {
    let source = local_with(&[wallet("w1", 1)]).await;
    let binding = DataBinding::new("wallet", Some(wallet("initial", 0)), source.clone());
    binding.load().await;
    assert_eq!(binding.get(), Some(wallet("w1", 1)));

    binding.delete("w1").await.unwrap();

    assert_eq!(binding.get(), Some(wallet("initial", 0)));
    assert!(source.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_failure_is_recorded_and_returned() {
    let binding = DataBinding::new("wallet", Some(wallet("w1", 1)), broken());

    assert!(binding.delete("w1").await.unwrap_err().is_not_found());
    assert!(binding.error().get().is_some());
    assert_eq!(binding.get(), Some(wallet("w1", 1)));
}

// ── write ───────────────────────────────────────────────────────

#[tokio::test]
async fn write_value_updates_record_under_binding_key() {
    let source = local_with(&[wallet("wallet", 10)]).await;
    let binding = DataBinding::new("wallet", None, source.clone());

    binding
        .write(WriteAction::Value(Some(wallet("wallet", 20))))
        .await;

    assert_eq!(binding.get(), Some(wallet("wallet", 20)));
    assert_eq!(source.get("wallet").await.unwrap().balance, 20);
    assert_eq!(binding.error().get(), None);
}

#[tokio::test]
async fn write_update_persists_each_record() {
    let source = local_with(&[wallet("w1", 1), wallet("w2", 2)]).await;
    let binding = DataBinding::new("wallet", Vec::new(), source.clone());
    binding.load().await;

    binding
        .write(WriteAction::update(|wallets: &Vec<Wallet>| {
            wallets
                .iter()
                .map(|w| wallet(&w.id, w.balance * 100))
                .collect()
        }))
        .await;

    assert_eq!(
        source.get_all().await.unwrap(),
        vec![wallet("w1", 100), wallet("w2", 200)]
    );
}

#[tokio::test]
async fn write_failure_keeps_local_value() {
    let binding = DataBinding::new("wallet", None, broken());

    binding.write(WriteAction::Value(Some(wallet("w1", 99)))).await;

    assert_eq!(binding.get(), Some(wallet("w1", 99)));
    assert!(binding.error().get().unwrap().contains("read only"));
    assert!(!binding.loading().get());
}

#[tokio::test]
async fn write_to_missing_record_records_not_found() {
    let source = local_with(&[]).await;
    let binding = DataBinding::new("wallet", None, source);

    binding.write(WriteAction::Value(Some(wallet("wallet", 1)))).await;

    assert_eq!(binding.get(), Some(wallet("wallet", 1)));
    assert!(binding.error().get().unwrap().contains("not found"));
}

#[tokio::test]
async fn reset_restores_initial_state() {
    let binding = DataBinding::new("wallet", Some(wallet("seed", 1)), broken());
    binding.write(WriteAction::Value(None)).await;
    binding.load().await;
    assert!(binding.error().get().is_some());

    binding.reset();
    assert_eq!(binding.get(), Some(wallet("seed", 1)));
    assert_eq!(binding.error().get(), None);
}

// ── mount ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn mount_loads_and_refreshes_until_dropped() {
    let source = Arc::new(GatedSource::default());
    let binding = Arc::new(DataBinding::with_options(
        "wallet",
        None,
        source.clone() as Arc<dyn DataSource<Wallet>>,
        BindingOptions {
            load_on_mount: true,
            refresh_interval: Some(Duration::from_secs(1)),
        },
    ));

    let task = binding.mount().await.unwrap();
    assert_eq!(source.loads.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(source.loads.load(Ordering::SeqCst), 4);
    assert_eq!(binding.get(), Some(wallet("w1", 3)));

    drop(task);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(source.loads.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn mount_without_interval_returns_no_task() {
    let source = Arc::new(GatedSource::default());
    let binding = Arc::new(DataBinding::with_options(
        "wallet",
        None,
        source.clone() as Arc<dyn DataSource<Wallet>>,
        BindingOptions {
            load_on_mount: false,
            refresh_interval: None,
        },
    ));

    assert!(binding.mount().await.is_none());
    assert_eq!(source.loads.load(Ordering::SeqCst), 0);
    assert_eq!(binding.get(), None);
}
