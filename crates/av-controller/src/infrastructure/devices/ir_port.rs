//! IR output port: the hardware seam behind IR-controlled devices.
//!
//! An [`IrOutputPort`] owns a driver, the list of command names an IR file
//! declares.  The driver is loaded in the background when the port is
//! activated; [`IrOutputPort::driver_loaded`] turns `true` once the command
//! list is available.  Pressing a command hands it to an [`IrTransmitter`].
//!
//! # Testability
//!
//! Both the transmitter and the driver loader are traits.  Production code
//! uses [`LoggingIrTransmitter`] and [`FileDriverLoader`]; unit tests use the
//! generated `MockIrTransmitter` and in-memory drivers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use av_core::{BoolFeedback, Device, DeviceError, Port, PortKind};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Error type for IR driver loading.
#[derive(Debug, Error)]
pub enum IrError {
    #[error("failed to read IR file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IR file {0} declares no commands")]
    Empty(PathBuf),

    #[error("no IR file or inline commands configured")]
    NoDriver,
}

/// Sends IR commands out of a physical port.
#[cfg_attr(test, mockall::automock)]
pub trait IrTransmitter: Send + Sync {
    fn press(&self, port_key: &str, command: &str, pressed: bool);
}

/// Transmitter that only logs; used when no IR hardware is attached.
#[derive(Debug, Default)]
pub struct LoggingIrTransmitter;

impl IrTransmitter for LoggingIrTransmitter {
    fn press(&self, port_key: &str, command: &str, pressed: bool) {
        let edge = if pressed { "press" } else { "release" };
        info!("[{port_key}] IR {command} {edge}");
    }
}

/// Where a port's command list comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrDriver {
    pub file: Option<PathBuf>,
    pub commands: Vec<String>,
}

/// Loads the command list of an [`IrDriver`].
#[async_trait]
pub trait IrDriverLoader: Send + Sync {
    async fn load(&self, driver: &IrDriver) -> Result<Vec<String>, IrError>;
}

/// Reads IR files from disk, resolving relative paths against `base_dir`.
///
/// Inline commands take precedence over a file.
#[derive(Debug, Clone)]
pub struct FileDriverLoader {
    base_dir: PathBuf,
}

impl FileDriverLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.base_dir.join(file)
        }
    }
}

#[async_trait]
impl IrDriverLoader for FileDriverLoader {
    async fn load(&self, driver: &IrDriver) -> Result<Vec<String>, IrError> {
        if !driver.commands.is_empty() {
            return Ok(driver.commands.clone());
        }
        let file = driver.file.as_deref().ok_or(IrError::NoDriver)?;
        let path = self.resolve(file);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| IrError::Io {
                path: path.clone(),
                source,
            })?;
        let commands = parse_ir_commands(&content);
        if commands.is_empty() {
            return Err(IrError::Empty(path));
        }
        Ok(commands)
    }
}

/// One command per line; blank lines and `#` comments are skipped and
/// duplicates keep their first position.
pub fn parse_ir_commands(content: &str) -> Vec<String> {
    let mut commands: Vec<String> = Vec::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !commands.iter().any(|c| c == line) {
            commands.push(line.to_string());
        }
    }
    commands
}

pub struct IrOutputPort {
    key: String,
    self_ref: Weak<IrOutputPort>,
    ports: Vec<Port>,
    driver: IrDriver,
    commands: Mutex<Arc<Vec<String>>>,
    driver_loaded: BoolFeedback,
    transmitter: Arc<dyn IrTransmitter>,
    loader: Arc<dyn IrDriverLoader>,
    load_task: Mutex<Option<JoinHandle<()>>>,
}

impl IrOutputPort {
    pub fn new(
        key: impl Into<String>,
        driver: IrDriver,
        transmitter: Arc<dyn IrTransmitter>,
        loader: Arc<dyn IrDriverLoader>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            key: key.into(),
            self_ref: self_ref.clone(),
            ports: vec![Port::output("irOut", PortKind::Ir)],
            driver,
            commands: Mutex::new(Arc::new(Vec::new())),
            driver_loaded: BoolFeedback::new(false),
            transmitter,
            loader,
            load_task: Mutex::new(None),
        })
    }

    /// Command names declared by the loaded driver, in file order.
    pub fn commands(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.commands.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn driver_loaded(&self) -> &BoolFeedback {
        &self.driver_loaded
    }

    fn load_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.load_task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the driver now and publishes the command list.
    ///
    /// Returns the number of commands.
    pub async fn load_driver(&self) -> Result<usize, IrError> {
        let commands = self.loader.load(&self.driver).await?;
        let count = commands.len();
        *self.commands.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(commands);
        info!("[{}] IR driver loaded with {count} commands", self.key);
        self.driver_loaded.set(true);
        Ok(count)
    }

    /// Sends `command` to the transmitter.  Returns `false` when the driver
    /// does not declare it.
    pub fn press(&self, command: &str, pressed: bool) -> bool {
        if !self.commands().iter().any(|c| c == command) {
            warn!("[{}] IR command '{command}' is not in the driver", self.key);
            return false;
        }
        self.transmitter.press(&self.key, command, pressed);
        true
    }
}

impl Device for IrOutputPort {
    fn key(&self) -> &str {
        &self.key
    }

    fn type_name(&self) -> &str {
        "irOutputPort"
    }

    fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Starts loading the driver in the background.  Idempotent.
    fn activate(&self) -> Result<(), DeviceError> {
        let mut slot = self.load_task();
        if slot.is_some() || self.driver_loaded.value() {
            return Ok(());
        }
        let runtime = Handle::try_current()
            .map_err(|_| DeviceError::Activation("no async runtime to load the IR driver".into()))?;

        let me = self.self_ref.clone();
        *slot = Some(runtime.spawn(async move {
            let Some(port) = me.upgrade() else {
                return;
            };
            if let Err(e) = port.load_driver().await {
                error!("[{}] {e}", port.key);
            }
        }));
        debug!("[{}] IR driver load started", self.key);
        Ok(())
    }

    fn deactivate(&self) -> Result<(), DeviceError> {
        if let Some(task) = self.load_task().take() {
            task.abort();
        }
        Ok(())
    }
}
