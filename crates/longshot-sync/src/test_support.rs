//! Recording in-memory [`IRemoteApi`] and device helpers for synchronizer tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use longshot_core::domain::{Credentials, Device, DevicePrefix};
use longshot_core::ports::{DeclareResponse, IRemoteApi, OrderAck, Orders, WireSample, WireValues};
use longshot_persistence::MemoryPersistence;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Declare {
        prefix: DevicePrefix,
        paths: Vec<String>,
    },
    GetOrders,
    Confirm(OrderAck),
    Sync(WireValues),
}

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
pub(crate) struct FakeApi {
    calls: Mutex<Vec<Call>>,
    declare_response: Mutex<DeclareResponse>,
    orders: Mutex<VecDeque<Orders>>,
    declare_failures: AtomicU32,
    fail_orders: AtomicBool,
    fail_sync: AtomicBool,
    during_declare: Mutex<Option<Hook>>,
}

impl FakeApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Server-side value returned for `path` on every declaration
    pub(crate) fn serve_value(&self, path: &str, sample: Option<WireSample>) {
        self.declare_response
            .lock()
            .unwrap()
            .values
            .insert(path.to_string(), sample);
    }

    /// Orders handed out by the next `get_orders` call
    pub(crate) fn push_orders(&self, orders: Orders) {
        self.orders.lock().unwrap().push_back(orders);
    }

    /// Make the next `n` declarations fail
    pub(crate) fn fail_declarations(&self, n: u32) {
        self.declare_failures.store(n, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_orders(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// Run `hook` while the next successful declaration is "in flight"
    pub(crate) fn during_declare(&self, hook: impl FnOnce() + Send + 'static) {
        *self.during_declare.lock().unwrap() = Some(Box::new(hook));
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn declare_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Declare { .. }))
    }

    pub(crate) fn orders_count(&self) -> usize {
        self.count(|c| matches!(c, Call::GetOrders))
    }

    pub(crate) fn sync_batches(&self) -> Vec<WireValues> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Sync(values) => Some(values),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn confirmations(&self) -> Vec<OrderAck> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Confirm(ack) => Some(ack),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IRemoteApi for FakeApi {
    async fn declare_paths(
        &self,
        _credentials: &Credentials,
        prefix: DevicePrefix,
        paths: &[String],
    ) -> anyhow::Result<DeclareResponse> {
        self.record(Call::Declare {
            prefix,
            paths: paths.to_vec(),
        });
        if self
            .declare_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("connection refused");
        }
        let hook = self.during_declare.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        Ok(self.declare_response.lock().unwrap().clone())
    }

    async fn get_orders(&self, _credentials: &Credentials) -> anyhow::Result<Orders> {
        self.record(Call::GetOrders);
        if self.fail_orders.load(Ordering::SeqCst) {
            anyhow::bail!("orders unavailable");
        }
        Ok(self.orders.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn confirm_orders(&self, _credentials: &Credentials, ack: &OrderAck) -> anyhow::Result<()> {
        self.record(Call::Confirm(ack.clone()));
        Ok(())
    }

    async fn sync_values(&self, _credentials: &Credentials, values: &WireValues) -> anyhow::Result<()> {
        self.record(Call::Sync(values.clone()));
        if self.fail_sync.load(Ordering::SeqCst) {
            anyhow::bail!("upload rejected");
        }
        Ok(())
    }
}

/// A device with prefix `l` backed by a fresh [`MemoryPersistence`]
pub(crate) fn device() -> (Arc<Device>, Arc<MemoryPersistence>) {
    let persistence = Arc::new(MemoryPersistence::new());
    let device = Device::with_persistence(
        Credentials::new("long1", "long1"),
        DevicePrefix::new('l'),
        persistence.clone(),
    );
    (Arc::new(device), persistence)
}
