//! Implementación Postgres (Diesel) del contrato `FlowStore`.
//!
//! Objetivo del módulo:
//! - Proveer el colaborador de almacenamiento durable con paridad 1:1
//!   respecto al backend en memoria de flow-core.
//! - El lock exclusivo por registro es `SELECT ... FOR UPDATE` sobre la
//!   fila del flow, dentro de una transacción `read_write`: bloquea solo
//!   transiciones sobre el mismo flow id; flows distintos no se ven.
//! - Todos los writes de una transición (fila de transición, update de
//!   estado, artefacto) comprometen en esa única transacción; cualquier
//!   fallo interno revierte el conjunto.
//! - El borrado del flow arrastra transiciones y artefactos vía FKs
//!   `ON DELETE CASCADE` (ver migraciones).
//! - Manejo básico de errores transitorios: reintento con backoff en las
//!   lecturas y al tomar conexión. La sección crítica NO se reintenta: un
//!   conflicto de serialización sube al llamador, que decide.

use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use serde_json::Value;
use uuid::Uuid;

use flow_core::{EngineError, FlowStore, FlowTx, NewFlow, StateChange, StoreError};
use flow_domain::{ArtefactRecord, Flow, TransitionRecord};
use log::{debug, error, warn};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{flow_artefacts, flow_transitions, flows};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// Al construirlo se corre automáticamente el set de migraciones
/// pendientes (una sola vez).
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción/tests de integración) o
/// simular en tests unitarios sin acoplar a r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    /// Obtiene una conexión lista para ejecutar consultas Diesel.
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Fila mapeada de la tabla `flows` para lecturas.
#[derive(Queryable, Debug)]
pub struct FlowRow {
    pub id: Uuid,
    pub flow_type: String,
    pub current_state: String,
    pub props: Value,
    pub completed_at: Option<chrono::DateTime<Utc>>,
    pub last_errored_at: Option<chrono::DateTime<Utc>>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl From<FlowRow> for Flow {
    fn from(row: FlowRow) -> Self {
        Flow { id: row.id,
               flow_type: row.flow_type,
               current_state: row.current_state,
               props: row.props,
               completed_at: row.completed_at,
               last_errored_at: row.last_errored_at,
               created_at: row.created_at,
               updated_at: row.updated_at }
    }
}

/// Estructura para inserción en `flows` (id y timestamps los pone la DB).
#[derive(Insertable, Debug)]
#[diesel(table_name = flows)]
pub struct NewFlowRow<'a> {
    pub flow_type: &'a str,
    pub current_state: &'a str,
    pub props: &'a Value,
}

/// Fila mapeada de `flow_transitions`.
#[derive(Queryable, Debug)]
pub struct TransitionRow {
    pub id: i64,
    pub flow_id: Uuid,
    pub transitioned_from: String,
    pub transitioned_to: String,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl From<TransitionRow> for TransitionRecord {
    fn from(row: TransitionRow) -> Self {
        TransitionRecord { id: row.id,
                           flow_id: row.flow_id,
                           transitioned_from: row.transitioned_from,
                           transitioned_to: row.transitioned_to,
                           created_at: row.created_at,
                           updated_at: row.updated_at }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = flow_transitions)]
pub struct NewTransitionRow<'a> {
    pub flow_id: &'a Uuid,
    pub transitioned_from: &'a str,
    pub transitioned_to: &'a str,
}

/// Fila mapeada de `flow_artefacts`.
#[derive(Queryable, Debug)]
pub struct ArtefactRow {
    pub id: i64,
    pub transition_id: i64,
    pub name: String,
    pub payload: Value,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl From<ArtefactRow> for ArtefactRecord {
    fn from(row: ArtefactRow) -> Self {
        ArtefactRecord { id: row.id,
                         transition_id: row.transition_id,
                         name: row.name,
                         payload: row.payload,
                         created_at: row.created_at,
                         updated_at: row.updated_at }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = flow_artefacts)]
pub struct NewArtefactRow<'a> {
    pub transition_id: i64,
    pub name: &'a str,
    pub payload: &'a Value,
}

/// Determina si un error es transitorio (recomendado reintentar con backoff).
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        // Algunos mensajes (dependen de driver/pg) llegan como Unknown con
        // texto. Best-effort string match sin acoplar a SQLSTATE.
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry simple con backoff muy pequeño (hasta 3 intentos). Solo repite la
/// unidad de trabajo provista por `f`; no altera semántica de negocio.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Fallo interno de la sección crítica: o un error del motor (rollback y
/// propagar tal cual) o un error de Diesel (rollback y mapear a Store).
enum TxFail {
    Engine(EngineError),
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for TxFail {
    fn from(e: diesel::result::Error) -> Self {
        TxFail::Db(e)
    }
}

/// Transacción en curso sobre la fila lockeada del flow.
///
/// `row` arranca con la relectura autoritativa bajo `FOR UPDATE` y se va
/// actualizando con cada write, de modo que `current()` siempre refleja lo
/// ya aplicado dentro de la transacción.
struct PgFlowTx<'a> {
    conn: &'a mut PgConnection,
    row: Flow,
}

impl<'a> FlowTx for PgFlowTx<'a> {
    fn current(&self) -> &Flow {
        &self.row
    }

    fn insert_transition(&mut self, from: &str, to: &str) -> Result<TransitionRecord, StoreError> {
        let row: TransitionRow = diesel::insert_into(flow_transitions::table)
            .values(NewTransitionRow { flow_id: &self.row.id,
                                       transitioned_from: from,
                                       transitioned_to: to })
            .get_result(&mut *self.conn)
            .map_err(|e| StoreError::from(PersistenceError::from(e)))?;
        Ok(row.into())
    }

    fn update_state(&mut self, change: &StateChange) -> Result<(), StoreError> {
        let target = flows::table.find(self.row.id);
        let updated: FlowRow = if let Some(errored_at) = change.errored_at {
            diesel::update(target).set((flows::current_state.eq(&change.to),
                                        flows::completed_at.eq(change.completed_at),
                                        flows::last_errored_at.eq(Some(errored_at)),
                                        flows::updated_at.eq(Utc::now())))
                                  .get_result(&mut *self.conn)
        } else {
            diesel::update(target).set((flows::current_state.eq(&change.to),
                                        flows::completed_at.eq(change.completed_at),
                                        flows::updated_at.eq(Utc::now())))
                                  .get_result(&mut *self.conn)
        }.map_err(|e| StoreError::from(PersistenceError::from(e)))?;
        self.row = updated.into();
        Ok(())
    }

    fn insert_artefact(&mut self, transition_id: i64, name: &str, payload: Value) -> Result<ArtefactRecord, StoreError> {
        let row: ArtefactRow = diesel::insert_into(flow_artefacts::table)
            .values(NewArtefactRow { transition_id,
                                     name,
                                     payload: &payload })
            .get_result(&mut *self.conn)
            .map_err(|e| StoreError::from(PersistenceError::from(e)))?;
        Ok(row.into())
    }
}

/// Store Postgres. Compartible entre engines/hilos; cada operación toma una
/// conexión del provider.
pub struct PgFlowStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgFlowStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: ConnectionProvider> FlowStore for PgFlowStore<P> {
    fn insert_flow(&self, new: NewFlow) -> Result<Flow, StoreError> {
        debug!("insert_flow:start type={}", new.flow_type);
        let row: FlowRow = with_retry(|| {
                               let mut conn = self.provider.connection()?;
                               diesel::insert_into(flows::table)
                                   .values(NewFlowRow { flow_type: &new.flow_type,
                                                        current_state: &new.current_state,
                                                        props: &new.props })
                                   .get_result(&mut conn)
                                   .map_err(PersistenceError::from)
                           }).map_err(|e| {
                                 error!("insert_flow:error type={} err={e:?}", new.flow_type);
                                 StoreError::from(e)
                             })?;
        debug!("insert_flow:done id={}", row.id);
        Ok(row.into())
    }

    fn find_flow(&self, id: Uuid) -> Result<Flow, StoreError> {
        let row: FlowRow = with_retry(|| {
                               let mut conn = self.provider.connection()?;
                               flows::table.find(id)
                                           .first(&mut conn)
                                           .map_err(PersistenceError::from)
                           }).map_err(StoreError::from)?;
        Ok(row.into())
    }

    fn with_flow_lock<T>(&self,
                         id: Uuid,
                         body: &mut dyn FnMut(&mut dyn FlowTx) -> Result<T, EngineError>)
                         -> Result<T, EngineError> {
        debug!("with_flow_lock:start flow_id={id}");
        let mut conn = self.provider
                           .connection()
                           .map_err(|e| EngineError::Store(StoreError::from(e)))?;

        // Sin retry alrededor de la transacción: el cuerpo no es seguro de
        // re-invocar y el reintento ante contención es del llamador.
        let result: Result<T, TxFail> = conn.build_transaction().read_write().run(|tx_conn| {
            // Lock exclusivo de la fila. Una fila inexistente (p.ej. flow ya
            // destruido) corta acá con not-found.
            let row: Option<FlowRow> = flows::table.find(id)
                                                   .for_update()
                                                   .first(&mut *tx_conn)
                                                   .optional()?;
            let row = row.ok_or(TxFail::Engine(EngineError::NotFound(id)))?;

            let mut tx = PgFlowTx { conn: tx_conn, row: row.into() };
            body(&mut tx).map_err(TxFail::Engine)
        });

        let out = result.map_err(|e| match e {
            TxFail::Engine(err) => err,
            TxFail::Db(db) => {
                error!("with_flow_lock:db error flow_id={id} err={db:?}");
                EngineError::Store(StoreError::from(PersistenceError::from(db)))
            }
        });
        debug!("with_flow_lock:done flow_id={id} ok={}", out.is_ok());
        out
    }

    fn delete_flow(&self, id: Uuid) -> Result<(), StoreError> {
        debug!("delete_flow:start flow_id={id}");
        // Idempotente: 0 filas afectadas no es error (residuo post-crash).
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::delete(flows::table.find(id)).execute(&mut conn)
                                                 .map_err(PersistenceError::from)
        }).map_err(StoreError::from)?;
        debug!("delete_flow:done flow_id={id}");
        Ok(())
    }

    fn transitions(&self, flow_id: Uuid) -> Result<Vec<TransitionRecord>, StoreError> {
        // Orden de commit = id secuencial; created_at no sirve de orden
        // (now() es el inicio de la transacción).
        let rows: Vec<TransitionRow> = with_retry(|| {
                                           let mut conn = self.provider.connection()?;
                                           flow_transitions::table
                                               .filter(flow_transitions::flow_id.eq(flow_id))
                                               .order(flow_transitions::id.asc())
                                               .load(&mut conn)
                                               .map_err(PersistenceError::from)
                                       }).map_err(StoreError::from)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn artefacts(&self, transition_id: i64) -> Result<Vec<ArtefactRecord>, StoreError> {
        let rows: Vec<ArtefactRow> = with_retry(|| {
                                         let mut conn = self.provider.connection()?;
                                         flow_artefacts::table
                                             .filter(flow_artefacts::transition_id.eq(transition_id))
                                             .order(flow_artefacts::id.asc())
                                             .load(&mut conn)
                                             .map_err(PersistenceError::from)
                                     }).map_err(StoreError::from)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Construye un pool Postgres r2d2 a partir de URL.
///
/// Valida y ajusta tamaños (si `min_size > max_size`, usa `min = max`) y
/// ejecuta las migraciones pendientes tras el primer checkout.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("min_size > max_size ({validated_min} > {validated_max}), ajustando min=max");
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración y construye un
/// pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env();
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
