//! Message boundary around a [`Model`].
//!
//! The presentation side talks to the engine only through [`Inbound`] and [`Outbound`]
//! messages. Messages that need a model and arrive before one is loaded are queued in arrival
//! order and flushed right after loading. [`spawn`] runs a worker on its own thread behind a
//! pair of channels.

use std::collections::{BTreeMap, VecDeque};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use glam::DVec3;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::{ModelProps, PropsError};
use crate::migration::{migrate, Migrated};
use crate::model::Model;
use crate::plate::PlateId;
use crate::preset::{model_from_image, PresetError, PresetImage};
use crate::serialization::{ModelOutput, ModelState, SerializedDocument, StateError};
use crate::snapshots::SnapshotStore;
use crate::spatial_index::SpatialIndex;

/// JSON object keys are always strings, and the tagged enum buffers them before the map sees
/// them, so plate ids are parsed here. Keys that are not ids are skipped.
fn plate_id_keys<'de, D>(deserializer: D) -> Result<BTreeMap<PlateId, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, f64>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, density)| match key.trim().parse::<PlateId>() {
            Ok(id) => Some((id, density)),
            Err(_) => {
                log::warn!("[worker] setDensities: skipped plate id {key:?}");
                None
            }
        })
        .collect())
}

/// Messages from the presentation side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    /// Build a model from a decoded preset image
    LoadPreset {
        /// Decoded image
        image: PresetImage,
    },
    /// Load a serialized document (any version)
    #[serde(rename_all = "camelCase")]
    LoadModel {
        /// Raw document
        serialized_state: Value,
    },
    /// Partial update of the live properties
    Props {
        /// Subset of `ModelProps` keys
        props: Value,
    },
    /// Advance exactly one step
    StepForward,
    /// Attach a hot spot to the plate under `position`
    SetHotSpot {
        /// World position
        position: [f64; 3],
        /// Force vector
        force: [f64; 3],
    },
    /// Replace plate densities
    SetDensities {
        /// Plate id to density
        #[serde(deserialize_with = "plate_id_keys")]
        densities: BTreeMap<PlateId, f64>,
    },
    /// Mark the field under `position`
    MarkField {
        /// World position
        position: [f64; 3],
    },
    /// Clear all markers
    UnmarkAllFields,
    /// Paint continental crust around `position`
    ContinentDrawing {
        /// World position
        position: [f64; 3],
    },
    /// Paint oceanic crust around `position`
    ContinentErasing {
        /// World position
        position: [f64; 3],
    },
    /// Remember the current state under the label
    TakeLabeledSnapshot,
    /// Go back to the labeled state
    RestoreLabeledSnapshot,
    /// Go back to the newest rolling snapshot
    RestoreSnapshot,
    /// Go back to the state right after loading
    RestoreInitialSnapshot,
    /// Emit the serialized document
    SaveModel,
    /// Drop the model and stop stepping
    Unload,
}

impl Inbound {
    fn needs_model(&self) -> bool {
        !matches!(
            self,
            Inbound::LoadPreset { .. } | Inbound::LoadModel { .. } | Inbound::Props { .. } | Inbound::Unload
        )
    }
}

/// Messages to the presentation side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    /// Full-model snapshot
    Output {
        /// Snapshot
        output: Box<ModelOutput>,
    },
    /// Serialized document, answer to `saveModel`
    #[serde(rename_all = "camelCase")]
    SavedModel {
        /// Document at the current version
        serialized_state: Box<SerializedDocument>,
    },
    /// The loaded document predates the compatibility cutoff
    IncompatibleModel,
    /// A request could not be served
    Error {
        /// Human-readable reason
        message: String,
    },
}

/// Errors while serving a message.
#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    /// Message text is not valid JSON or not a known message
    #[error("bad message: {0}")]
    Message(#[from] serde_json::Error),
    /// Serialized state could not be loaded
    #[error(transparent)]
    State(#[from] StateError),
    /// Preset image rejected
    #[error(transparent)]
    Preset(#[from] PresetError),
    /// Props update rejected
    #[error(transparent)]
    Props(#[from] PropsError),
}

/// Synchronous worker: feed messages with [`Worker::post`], advance with [`Worker::tick`], and
/// collect replies with [`Worker::drain`].
#[derive(Debug)]
pub struct Worker {
    index: Arc<SpatialIndex>,
    model: Option<Model>,
    props: ModelProps,
    queue: VecDeque<Inbound>,
    outbox: VecDeque<Outbound>,
    snapshots: SnapshotStore,
    ticks_since_output: u32,
}

impl Worker {
    /// Idle worker without a model.
    pub fn new(index: Arc<SpatialIndex>) -> Self {
        let props = ModelProps::default();
        let snapshots = SnapshotStore::new(props.max_snapshots);
        Self {
            index,
            model: None,
            props,
            queue: VecDeque::new(),
            outbox: VecDeque::new(),
            snapshots,
            ticks_since_output: 0,
        }
    }

    /// Loaded model.
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Live properties.
    pub fn props(&self) -> &ModelProps {
        &self.props
    }

    /// Messages waiting for a model.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Number of rolling snapshots held.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Take every pending outbound message.
    pub fn drain(&mut self) -> Vec<Outbound> {
        self.outbox.drain(..).collect()
    }

    /// Parse and post a JSON message. Parse failures are also reported as `error` messages.
    pub fn post_json(&mut self, text: &str) -> Result<(), WorkerError> {
        match serde_json::from_str::<Inbound>(text) {
            Ok(msg) => {
                self.post(msg);
                Ok(())
            }
            Err(e) => {
                self.outbox.push_back(Outbound::Error { message: e.to_string() });
                Err(e.into())
            }
        }
    }

    /// Serve one message, or queue it until a model exists.
    pub fn post(&mut self, msg: Inbound) {
        if self.model.is_none() && msg.needs_model() {
            log::debug!("[worker] queued message until a model is loaded");
            self.queue.push_back(msg);
            return;
        }
        let was_loaded = self.model.is_some();
        if let Err(e) = self.handle(msg) {
            log::warn!("[worker] {e}");
            self.outbox.push_back(Outbound::Error { message: e.to_string() });
        }
        if !was_loaded && self.model.is_some() {
            self.flush_queue();
        }
    }

    fn flush_queue(&mut self) {
        while let Some(msg) = self.queue.pop_front() {
            if let Err(e) = self.handle(msg) {
                log::warn!("[worker] {e}");
                self.outbox.push_back(Outbound::Error { message: e.to_string() });
            }
            if self.model.is_none() {
                break;
            }
        }
    }

    /// Advance a playing model by one step. Emits `output` every `output_interval` ticks.
    /// Returns true when a step was taken.
    pub fn tick(&mut self) -> bool {
        if !self.props.playing || self.model.is_none() {
            return false;
        }
        self.step_model();
        self.ticks_since_output += 1;
        if self.ticks_since_output >= self.props.output_interval {
            self.ticks_since_output = 0;
            self.emit_output();
        }
        true
    }

    /// Step once. Every `snapshot_interval` steps the state before the step is pushed, so
    /// `restoreSnapshot` goes back at least one step.
    fn step_model(&mut self) {
        let Some(model) = self.model.as_mut() else { return };
        if model.step_idx() % u64::from(self.props.snapshot_interval) == 0 {
            self.snapshots.push(model.to_state());
        }
        model.step();
    }

    fn emit_output(&mut self) {
        if let Some(model) = &self.model {
            self.outbox.push_back(Outbound::Output { output: Box::new(model.output()) });
        }
    }

    fn install(&mut self, model: Model) {
        self.snapshots = SnapshotStore::new(self.props.max_snapshots);
        self.snapshots.reset(model.to_state());
        self.ticks_since_output = 0;
        self.model = Some(model);
        self.emit_output();
    }

    fn restore(&mut self, state: Option<ModelState>) -> Result<(), WorkerError> {
        let Some(state) = state else {
            log::debug!("[worker] nothing to restore");
            return Ok(());
        };
        let mut model = Model::from_state(self.index.clone(), &state)?;
        model.props = self.props.clone();
        self.model = Some(model);
        self.emit_output();
        Ok(())
    }

    fn handle(&mut self, msg: Inbound) -> Result<(), WorkerError> {
        match msg {
            Inbound::LoadPreset { image } => {
                let model = model_from_image(self.index.clone(), &image, self.props.clone())?;
                self.install(model);
            }
            Inbound::LoadModel { serialized_state } => match migrate(serialized_state)? {
                Migrated::IncompatibleModel => self.outbox.push_back(Outbound::IncompatibleModel),
                Migrated::Document(doc) => {
                    let mut model = Model::from_state(self.index.clone(), &doc.model_state)?;
                    model.props = self.props.clone();
                    self.install(model);
                }
            },
            Inbound::Props { props } => {
                let old_seed = self.props.seed;
                self.props.apply_patch(&props)?;
                self.snapshots.set_capacity(self.props.max_snapshots);
                if let Some(model) = &mut self.model {
                    model.props = self.props.clone();
                    if self.props.deterministic && self.props.seed != old_seed {
                        model.reseed(self.props.seed);
                    }
                }
            }
            Inbound::Unload => {
                self.model = None;
                self.queue.clear();
                self.snapshots = SnapshotStore::new(self.props.max_snapshots);
                log::info!("[worker] model unloaded");
            }
            Inbound::TakeLabeledSnapshot => {
                if let Some(model) = &self.model {
                    self.snapshots.take_labeled(model.to_state());
                }
            }
            Inbound::RestoreLabeledSnapshot => {
                let s = self.snapshots.labeled();
                self.restore(s)?;
            }
            Inbound::RestoreSnapshot => {
                let s = self.snapshots.step_back();
                self.restore(s)?;
            }
            Inbound::RestoreInitialSnapshot => {
                let s = self.snapshots.initial();
                self.restore(s)?;
            }
            Inbound::StepForward => {
                self.step_model();
                self.emit_output();
            }
            Inbound::SaveModel => {
                if let Some(model) = &self.model {
                    let doc = model.to_document(Value::Object(Default::default()));
                    self.outbox.push_back(Outbound::SavedModel { serialized_state: Box::new(doc) });
                }
            }
            edit => {
                self.edit(edit);
                self.emit_output();
            }
        }
        Ok(())
    }

    fn edit(&mut self, msg: Inbound) {
        let Some(model) = self.model.as_mut() else { return };
        let applied = match msg {
            Inbound::SetHotSpot { position, force } => {
                model.set_hot_spot(DVec3::from_array(position), DVec3::from_array(force))
            }
            Inbound::SetDensities { densities } => {
                model.set_densities(&densities);
                true
            }
            Inbound::MarkField { position } => model.mark_field(DVec3::from_array(position)),
            Inbound::UnmarkAllFields => {
                model.unmark_all_fields();
                true
            }
            Inbound::ContinentDrawing { position } => model.draw_continent(DVec3::from_array(position)) > 0,
            Inbound::ContinentErasing { position } => model.erase_continent(DVec3::from_array(position)) > 0,
            _ => true,
        };
        if !applied {
            log::debug!("[worker] edit had no target");
        }
    }
}

/// Handle to a worker running on its own thread.
#[derive(Debug)]
pub struct WorkerHandle {
    /// Inbound channel
    pub sender: Sender<Inbound>,
    /// Outbound channel
    pub receiver: Receiver<Outbound>,
    /// Worker thread; it ends when `sender` is dropped
    pub thread: JoinHandle<()>,
}

/// Idle wait between polls while the model is paused.
const IDLE_POLL: Duration = Duration::from_millis(20);

/// Run a worker on a dedicated thread. Stepping never blocks on the receiver: replies are sent
/// as they are produced and the loop only waits for input while paused.
pub fn spawn(index: Arc<SpatialIndex>) -> WorkerHandle {
    let (in_tx, in_rx) = mpsc::channel::<Inbound>();
    let (out_tx, out_rx) = mpsc::channel::<Outbound>();
    let thread = std::thread::spawn(move || {
        let mut worker = Worker::new(index);
        loop {
            let playing = worker.props.playing && worker.model.is_some();
            let first = if playing {
                match in_rx.try_recv() {
                    Ok(m) => Some(m),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => break,
                }
            } else {
                match in_rx.recv_timeout(IDLE_POLL) {
                    Ok(m) => Some(m),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            };
            if let Some(m) = first {
                worker.post(m);
                while let Ok(m) = in_rx.try_recv() {
                    worker.post(m);
                }
            }
            worker.tick();
            for out in worker.drain() {
                if out_tx.send(out).is_err() {
                    return;
                }
            }
        }
        log::debug!("[worker] channel closed");
    });
    WorkerHandle { sender: in_tx, receiver: out_rx, thread }
}
