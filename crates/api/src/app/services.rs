use std::io;
use std::sync::Arc;

use tracing::info;

use clinicore_core::AggregateId;
use clinicore_events::InMemoryEventBus;
use clinicore_infra::{
    InMemoryDispatcher,
    event_store::InMemoryEventStore,
    projections::{MaterialStockProjection, MaterialStockView},
    read_model::InMemoryReadStore,
    services::{
        AppointmentWorkflow, ConsumptionRecorder, CostAggregator, JsonEnvelope, MaterialCatalog,
        StockLedger,
    },
    workers::{ProjectionWorker, WorkerHandle},
};
use clinicore_materials::AGGREGATE_TYPE as MATERIAL_STREAM;

type Store = Arc<InMemoryEventStore>;
type Bus = Arc<InMemoryEventBus<JsonEnvelope>>;

pub type StockProjection =
    MaterialStockProjection<Arc<InMemoryReadStore<AggregateId, MaterialStockView>>>;

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppServices {
    pub workflow: AppointmentWorkflow<Store, Bus>,
    pub catalog: MaterialCatalog<Store, Bus>,
    pub ledger: StockLedger<Store, Bus>,
    pub consumption: ConsumptionRecorder<Store, Bus>,
    pub costs: CostAggregator<Store, Bus>,
    pub stock_view: Arc<StockProjection>,
    _stock_worker: WorkerHandle,
}

impl core::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppServices").finish_non_exhaustive()
    }
}

/// Wire the in-memory store and bus, the services, and the low-stock projection worker.
pub fn build_services() -> io::Result<AppServices> {
    let store: Store = Arc::new(InMemoryEventStore::new());
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = Arc::new(InMemoryDispatcher::new(store, bus.clone()));

    let stock_view: Arc<StockProjection> =
        Arc::new(MaterialStockProjection::new(Arc::new(InMemoryReadStore::new())));
    let projection = stock_view.clone();
    let stock_worker = ProjectionWorker::spawn(
        "material-stock-projection",
        bus,
        Some(MATERIAL_STREAM),
        move |env: JsonEnvelope| projection.apply_envelope(&env),
    )?;
    info!("material stock projection worker started");

    Ok(AppServices {
        workflow: AppointmentWorkflow::new(dispatcher.clone()),
        catalog: MaterialCatalog::new(dispatcher.clone()),
        ledger: StockLedger::new(dispatcher.clone()),
        consumption: ConsumptionRecorder::new(dispatcher.clone()),
        costs: CostAggregator::new(dispatcher),
        stock_view,
        _stock_worker: stock_worker,
    })
}
