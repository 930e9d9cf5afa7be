//! Node value buffers and their time-series persistence.
//!
//! Each node owns a `sim` and an `obs` sequence. A sequence is a shared
//! scalar that models read and write during one simulation step, plus an
//! optional series holding one value per step:
//! - in RAM, as a `Vec<f64>`
//! - on disk, as a file of little-endian 8-byte doubles, one per step
//!
//! Loading and saving always move exactly one value per call.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

/// Size of one stored value in a disk series.
pub const VALUE_BYTES: usize = 8;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A scalar shared between a node and the models wired to it.
pub type SharedScalar = Rc<Cell<f64>>;

/// Create a new shared scalar holding `value`.
pub fn shared_scalar(value: f64) -> SharedScalar {
    Rc::new(Cell::new(value))
}

/// Where and how long series are allocated.
#[derive(Debug, Clone)]
pub struct SeriesOptions {
    /// Number of simulation steps.
    pub steps: usize,
    /// Keep series in RAM (`true`) or on disk (`false`).
    pub ram: bool,
    /// Directory for disk series.
    pub dir: PathBuf,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        Self {
            steps: 0,
            ram: true,
            dir: std::env::temp_dir(),
        }
    }
}

impl SeriesOptions {
    /// RAM series of the given length.
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            ..Default::default()
        }
    }

    /// Store series as files below `dir`.
    pub fn on_disk(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ram = false;
        self.dir = dir.into();
        self
    }

    /// Store series in RAM.
    pub fn in_ram(mut self) -> Self {
        self.ram = true;
        self
    }
}

/// The two sequences every node carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    /// Simulated values.
    Sim,
    /// Externally supplied (observed) values.
    Obs,
}

impl SequenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SequenceKind::Sim => "sim",
            SequenceKind::Obs => "obs",
        }
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sequence groups of an element's model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesGroup {
    Inputs,
    Fluxes,
    States,
}

impl SeriesGroup {
    pub const ALL: [SeriesGroup; 3] = [SeriesGroup::Inputs, SeriesGroup::Fluxes, SeriesGroup::States];
}

/// Current storage of a sequence's series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Inactive,
    Ram,
    Disk,
}

enum Storage {
    Inactive,
    Ram(Vec<f64>),
    Disk {
        path: PathBuf,
        file: File,
        steps: usize,
    },
}

/// One node sequence: the shared current value and its optional series.
pub struct NodeSequence {
    id: u64,
    kind: SequenceKind,
    value: SharedScalar,
    storage: RefCell<Storage>,
}

impl NodeSequence {
    pub(crate) fn new(kind: SequenceKind) -> Self {
        Self {
            id: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            kind,
            value: shared_scalar(0.0),
            storage: RefCell::new(Storage::Inactive),
        }
    }

    /// Which of the node's two sequences this is.
    pub fn kind(&self) -> SequenceKind {
        self.kind
    }

    /// The current value.
    pub fn value(&self) -> f64 {
        self.value.get()
    }

    /// Overwrite the current value.
    pub fn set_value(&self, value: f64) {
        self.value.set(value);
    }

    /// The shared buffer holding the current value.
    pub fn shared(&self) -> SharedScalar {
        Rc::clone(&self.value)
    }

    /// Where the series currently lives.
    pub fn mode(&self) -> StorageMode {
        match &*self.storage.borrow() {
            Storage::Inactive => StorageMode::Inactive,
            Storage::Ram(_) => StorageMode::Ram,
            Storage::Disk { .. } => StorageMode::Disk,
        }
    }

    /// Path of the backing file, for disk series.
    pub fn path(&self) -> Option<PathBuf> {
        match &*self.storage.borrow() {
            Storage::Disk { path, .. } => Some(path.clone()),
            _ => None,
        }
    }

    /// Allocate a zero-filled RAM series.
    pub fn activate_ram(&self, steps: usize) {
        *self.storage.borrow_mut() = Storage::Ram(vec![0.0; steps]);
    }

    /// Allocate a zero-filled disk series at `path`, replacing any file there.
    pub fn activate_disk(&self, path: &Path, steps: usize) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((steps * VALUE_BYTES) as u64)?;
        *self.storage.borrow_mut() = Storage::Disk {
            path: path.to_path_buf(),
            file,
            steps,
        };
        Ok(())
    }

    /// File name of this sequence's disk series.
    ///
    /// The node name is only a readable prefix. The process id and the
    /// sequence id keep the file apart from every other live sequence, even
    /// after renames or when several networks share one directory.
    pub fn file_name(&self, node: &str) -> String {
        format!("{}_{}_{}_{}.bin", node, self.kind, std::process::id(), self.id)
    }

    pub(crate) fn activate(&self, options: &SeriesOptions, node: &str) -> Result<()> {
        if options.ram {
            self.activate_ram(options.steps);
            Ok(())
        } else {
            let path = options.dir.join(self.file_name(node));
            self.activate_disk(&path, options.steps)
        }
    }

    /// Drop the series; the current value is kept.
    pub fn deactivate(&self) {
        *self.storage.borrow_mut() = Storage::Inactive;
    }

    /// Copy the value of step `idx` into the current value.
    ///
    /// Does nothing when no series is active.
    pub fn load(&self, idx: usize) -> Result<()> {
        let mut storage = self.storage.borrow_mut();
        match &mut *storage {
            Storage::Inactive => {}
            Storage::Ram(values) => {
                let len = values.len();
                let value = values
                    .get(idx)
                    .copied()
                    .ok_or(Error::StepOutOfRange { index: idx, len })?;
                self.value.set(value);
            }
            Storage::Disk { file, steps, .. } => {
                check_step(idx, *steps)?;
                file.seek(SeekFrom::Start((idx * VALUE_BYTES) as u64))?;
                let mut raw = [0u8; VALUE_BYTES];
                file.read_exact(&mut raw)?;
                self.value.set(f64::from_le_bytes(raw));
            }
        }
        Ok(())
    }

    /// Store the current value as step `idx`.
    ///
    /// Does nothing when no series is active.
    pub fn save(&self, idx: usize) -> Result<()> {
        let mut storage = self.storage.borrow_mut();
        match &mut *storage {
            Storage::Inactive => {}
            Storage::Ram(values) => {
                let len = values.len();
                let slot = values
                    .get_mut(idx)
                    .ok_or(Error::StepOutOfRange { index: idx, len })?;
                *slot = self.value.get();
            }
            Storage::Disk { file, steps, .. } => {
                check_step(idx, *steps)?;
                file.seek(SeekFrom::Start((idx * VALUE_BYTES) as u64))?;
                file.write_all(&self.value.get().to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// The whole series; empty when no series is active.
    pub fn series(&self) -> Result<Vec<f64>> {
        let mut storage = self.storage.borrow_mut();
        match &mut *storage {
            Storage::Inactive => Ok(Vec::new()),
            Storage::Ram(values) => Ok(values.clone()),
            Storage::Disk { file, steps, .. } => {
                file.seek(SeekFrom::Start(0))?;
                let mut raw = vec![0u8; *steps * VALUE_BYTES];
                file.read_exact(&mut raw)?;
                Ok(raw.chunks_exact(VALUE_BYTES).map(read_f64_le).collect())
            }
        }
    }

    /// Replace the whole series, e.g. with observed data.
    ///
    /// An inactive sequence switches to a RAM series.
    pub fn set_series(&self, values: &[f64]) -> Result<()> {
        let mut storage = self.storage.borrow_mut();
        if let Storage::Disk { file, steps, .. } = &mut *storage {
            file.set_len((values.len() * VALUE_BYTES) as u64)?;
            file.seek(SeekFrom::Start(0))?;
            for value in values {
                file.write_all(&value.to_le_bytes())?;
            }
            file.flush()?;
            *steps = values.len();
            return Ok(());
        }
        *storage = Storage::Ram(values.to_vec());
        Ok(())
    }
}

impl fmt::Debug for NodeSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSequence")
            .field("kind", &self.kind)
            .field("value", &self.value.get())
            .field("mode", &self.mode())
            .finish()
    }
}

fn check_step(idx: usize, steps: usize) -> Result<()> {
    if idx < steps {
        Ok(())
    } else {
        Err(Error::StepOutOfRange {
            index: idx,
            len: steps,
        })
    }
}

/// Read a little-endian f64 from bytes.
fn read_f64_le(data: &[u8]) -> f64 {
    let bytes: [u8; VALUE_BYTES] = data[..VALUE_BYTES].try_into().unwrap_or([0; VALUE_BYTES]);
    f64::from_le_bytes(bytes)
}
