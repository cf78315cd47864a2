//! Generic IR controller: exposes every command of an IR driver on a bridge.
//!
//! The controller owns an [`IrOutputPort`] and registers it as a device of
//! its own on activation.  Because the port loads its driver in the
//! background, a bridge may ask the controller to bind before the command
//! list exists; the request is parked in a [`DeferredBinding`] and replayed
//! once, when the driver-loaded feedback turns `true`.
//!
//! # Join mapping modes
//!
//! - **Legacy** (default): one digital join per driver command, numbered from
//!   0 in file order.
//! - **Explicit** (`useBridgeJoinMap: true`): the standard named IR join table
//!   (or the configured override) filtered to the commands the driver
//!   actually has.  Commands missing from the map are simply not bridged.
//!
//! The bridge's join offset is added in both modes.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use av_core::domain::factory::BuildResult;
use av_core::protocol::binding::{DeferredBinding, JoinBinder};
use av_core::protocol::ir_joins::standard_ir_join_map;
use av_core::{
    BridgeError, Bridgeable, BuildContext, Device, DeviceConfig, DeviceError, DeviceFactory,
    DeviceHandle, DeviceRegistry, JoinMap, LinkRequest, RegistryError,
};
use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ir_port::{IrDriver, IrOutputPort};
use super::DeviceServices;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IrControllerProperties {
    #[serde(default)]
    ir_file: Option<PathBuf>,
    #[serde(default)]
    commands: Vec<String>,
    #[serde(default)]
    port_key: Option<String>,
    #[serde(default)]
    use_bridge_join_map: bool,
}

pub struct GenericIrController {
    key: String,
    name: String,
    self_ref: Weak<GenericIrController>,
    port: Arc<IrOutputPort>,
    registry: Arc<DeviceRegistry>,
    use_bridge_join_map: bool,
    binding: DeferredBinding,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl GenericIrController {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        port: Arc<IrOutputPort>,
        registry: Arc<DeviceRegistry>,
        use_bridge_join_map: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            key: key.into(),
            name: name.into(),
            self_ref: self_ref.clone(),
            port,
            registry,
            use_bridge_join_map,
            binding: DeferredBinding::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn port(&self) -> &Arc<IrOutputPort> {
        &self.port
    }

    pub fn commands(&self) -> Arc<Vec<String>> {
        self.port.commands()
    }

    pub fn press(&self, command: &str, pressed: bool) -> bool {
        self.port.press(command, pressed)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_bound()
    }

    /// Handles the port's driver-loaded event, binding a parked request.
    pub fn on_driver_loaded(&self) {
        if let Some(request) = self.binding.driver_loaded() {
            debug!("[{}] driver loaded; completing deferred bridge link", self.key);
            if let Err(e) = self.bind(request) {
                error!("[{}] deferred bridge link failed: {e}", self.key);
            }
        }
    }

    fn join_map_for(&self, request: &LinkRequest) -> JoinMap {
        let commands = self.port.commands();
        if self.use_bridge_join_map {
            info!("[{}] using IR bridge join map", self.key);
            let mut map = request.load_join_map(&self.key, standard_ir_join_map());
            map.retain_names(|name| commands.iter().any(|c| c == name));
            map
        } else {
            info!("[{}] using legacy IR join mapping based on available IR commands", self.key);
            JoinMap::synthesize_digital(commands.iter().map(String::as_str))
        }
    }

    fn bind(&self, request: LinkRequest) -> Result<(), BridgeError> {
        let mut map = self.join_map_for(&request);
        map.apply_offset(request.join_start)?;

        let names: Vec<String> = map.names().map(str::to_string).collect();
        let mut binder = JoinBinder::new(&self.key, Arc::clone(&request.link), &map);
        for command in names {
            let port = Arc::downgrade(&self.port);
            let cmd = command.clone();
            binder.on_bool(&command, move |pressed| {
                if let Some(port) = port.upgrade() {
                    port.press(&cmd, pressed);
                }
            });
        }
        binder.finish();

        debug!("{}", map.to_text(&self.key));
        request.register(&self.key, map);
        Ok(())
    }

    fn register_port(&self) {
        let handle: DeviceHandle = Arc::clone(&self.port) as DeviceHandle;
        match self.registry.add(handle) {
            Ok(()) => debug!("[{}] registered IR port '{}'", self.key, self.port.key()),
            Err(RegistryError::DuplicateKey(_)) if self.registry.get(self.port.key()).is_some() => {}
            Err(e) => warn!("[{}] {e}", self.key),
        }
    }
}

impl Device for GenericIrController {
    fn key(&self) -> &str {
        &self.key
    }

    fn name(&self) -> &str {
        if self.name.is_empty() {
            &self.key
        } else {
            &self.name
        }
    }

    fn type_name(&self) -> &str {
        "genericIrController"
    }

    fn activate(&self) -> Result<(), DeviceError> {
        self.register_port();
        self.port.activate()?;

        let runtime = Handle::try_current()
            .map_err(|_| DeviceError::Activation("no async runtime to watch the IR driver".into()))?;
        let mut loaded = self.port.driver_loaded().subscribe();
        let me = self.self_ref.clone();
        let watcher = runtime.spawn(async move {
            if loaded.wait_for(|v| *v).await.is_ok() {
                if let Some(controller) = me.upgrade() {
                    controller.on_driver_loaded();
                }
            }
        });
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner).push(watcher);
        Ok(())
    }

    fn deactivate(&self) -> Result<(), DeviceError> {
        for task in self.tasks.lock().unwrap_or_else(PoisonError::into_inner).drain(..) {
            task.abort();
        }
        self.port.deactivate()
    }

    fn as_bridgeable(&self) -> Option<&dyn Bridgeable> {
        Some(self)
    }
}

impl Bridgeable for GenericIrController {
    fn link_to_api(&self, request: LinkRequest) -> Result<(), BridgeError> {
        match self.binding.request(request) {
            Some(request) => self.bind(request),
            None => {
                debug!("[{}] IR driver not loaded; bridge link deferred", self.key);
                Ok(())
            }
        }
    }
}

pub fn register(factory: &mut DeviceFactory, services: &DeviceServices) {
    let services = services.clone();
    factory.register(
        "genericIrController",
        "Bridges every command of an IR driver",
        move |entry, ctx| build_ir_controller(entry, ctx, &services),
    );
}

fn build_ir_controller(
    entry: &DeviceConfig,
    ctx: &BuildContext,
    services: &DeviceServices,
) -> BuildResult {
    let props: IrControllerProperties = entry.properties()?;
    if props.ir_file.is_none() && props.commands.is_empty() {
        return Err(format!("'{}' needs an irFile or inline commands", entry.key).into());
    }
    let port_key = props.port_key.unwrap_or_else(|| format!("{}-irPort", entry.key));
    let port = IrOutputPort::new(
        port_key,
        IrDriver {
            file: props.ir_file,
            commands: props.commands,
        },
        Arc::clone(&services.ir_transmitter),
        Arc::clone(&services.ir_loader),
    );
    Ok(GenericIrController::new(
        entry.key.clone(),
        entry.name.clone(),
        port,
        Arc::clone(&ctx.registry),
        props.use_bridge_join_map,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::devices::ir_port::{IrDriverLoader, IrError, MockIrTransmitter};
    use async_trait::async_trait;
    use av_core::protocol::bridge::BridgeRegistration;
    use av_core::protocol::join_map::JoinMapError;
    use av_core::{BridgeJoinTables, MemoryLink};
    use mockall::predicate::eq;
    use serde_json::json;

    struct InlineLoader;

    #[async_trait]
    impl IrDriverLoader for InlineLoader {
        async fn load(&self, driver: &IrDriver) -> Result<Vec<String>, IrError> {
            Ok(driver.commands.clone())
        }
    }

    fn controller(transmitter: MockIrTransmitter, explicit: bool) -> Arc<GenericIrController> {
        let port = IrOutputPort::new(
            "bluray-ir",
            IrDriver {
                file: None,
                commands: vec!["POWER".into(), "PLAY".into(), "CUSTOM_1".into()],
            },
            Arc::new(transmitter),
            Arc::new(InlineLoader),
        );
        GenericIrController::new("bluray", "", port, Arc::new(DeviceRegistry::new()), explicit)
    }

    // ── Join mapping ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_legacy_mode_numbers_commands_from_offset() {
        // Arrange
        let device = controller(MockIrTransmitter::new(), false);
        device.port().load_driver().await.unwrap();
        device.on_driver_loaded();
        let tables = Arc::new(BridgeJoinTables::new());
        let link = Arc::new(MemoryLink::new("eisc"));

        // Act
        device
            .link_to_api(
                LinkRequest::new(link.clone(), 20)
                    .with_registration(BridgeRegistration::new("eisc", Arc::clone(&tables))),
            )
            .unwrap();

        // Assert
        let map = tables.get("eisc", "bluray").unwrap();
        assert_eq!(map.join_number("POWER"), Some(20));
        assert_eq!(map.join_number("PLAY"), Some(21));
        assert_eq!(map.join_number("CUSTOM_1"), Some(22));
    }

    #[tokio::test]
    async fn test_overflowing_offset_is_reported_and_nothing_registered() {
        let device = controller(MockIrTransmitter::new(), false);
        device.port().load_driver().await.unwrap();
        device.on_driver_loaded();
        let tables = Arc::new(BridgeJoinTables::new());
        let request = LinkRequest::new(Arc::new(MemoryLink::new("eisc")), u32::MAX - 1)
            .with_registration(BridgeRegistration::new("eisc", Arc::clone(&tables)));

        let result = device.link_to_api(request);

        assert!(matches!(result, Err(BridgeError::JoinMap(JoinMapError::AddressOverflow { .. }))));
        assert!(tables.get("eisc", "bluray").is_none());
    }

    #[tokio::test]
    async fn test_explicit_mode_binds_only_standard_commands_the_driver_has() {
        // Arrange
        let mut transmitter = MockIrTransmitter::new();
        transmitter
            .expect_press()
            .with(eq("bluray-ir"), eq("POWER"), eq(true))
            .times(1)
            .return_const(());
        let device = controller(transmitter, true);
        device.port().load_driver().await.unwrap();
        device.on_driver_loaded();
        let tables = Arc::new(BridgeJoinTables::new());
        let link = Arc::new(MemoryLink::new("eisc"));

        // Act
        device
            .link_to_api(
                LinkRequest::new(link.clone(), 100)
                    .with_registration(BridgeRegistration::new("eisc", Arc::clone(&tables))),
            )
            .unwrap();
        let pressed = link.press_bool(109, true);

        // Assert
        let map = tables.get("eisc", "bluray").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.join_number("PLAY"), Some(101));
        assert!(!map.contains("CUSTOM_1"));
        assert!(pressed);
    }

    #[tokio::test]
    async fn test_explicit_mode_uses_override_map_when_configured() {
        // Arrange
        let device = controller(MockIrTransmitter::new(), true);
        device.port().load_driver().await.unwrap();
        device.on_driver_loaded();
        let tables = Arc::new(BridgeJoinTables::new());
        let mut overrides = av_core::protocol::bridge::JoinMapOverrides::new();
        overrides.insert(
            "irMap".into(),
            json!({ "POWER": { "joinNumber": 50, "joinType": "digital" } }),
        );

        // Act
        device
            .link_to_api(
                LinkRequest::new(Arc::new(MemoryLink::new("eisc")), 0)
                    .with_join_map_key("irMap")
                    .with_overrides(Arc::new(overrides))
                    .with_registration(BridgeRegistration::new("eisc", Arc::clone(&tables))),
            )
            .unwrap();

        // Assert
        let map = tables.get("eisc", "bluray").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.join_number("POWER"), Some(50));
    }

    // ── Deferred binding ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_activation_completes_deferred_link_once_driver_loads() {
        // Arrange
        let registry = Arc::new(DeviceRegistry::new());
        let port = IrOutputPort::new(
            "tv-ir",
            IrDriver {
                file: None,
                commands: vec!["POWER".into()],
            },
            Arc::new(MockIrTransmitter::new()),
            Arc::new(InlineLoader),
        );
        let device = GenericIrController::new("tv", "", port, Arc::clone(&registry), false);
        let tables = Arc::new(BridgeJoinTables::new());
        device
            .link_to_api(
                LinkRequest::new(Arc::new(MemoryLink::new("eisc")), 0)
                    .with_registration(BridgeRegistration::new("eisc", Arc::clone(&tables))),
            )
            .unwrap();
        assert!(tables.get("eisc", "tv").is_none());

        // Act
        device.activate().unwrap();
        let mut loaded = device.port().driver_loaded().subscribe();
        loaded.wait_for(|v| *v).await.unwrap();
        for _ in 0..10 {
            if device.is_bound() {
                break;
            }
            tokio::task::yield_now().await;
        }

        // Assert
        assert!(device.is_bound());
        assert!(tables.get("eisc", "tv").is_some());
        assert!(registry.contains("tv-ir"));
    }

    #[test]
    fn test_builder_requires_a_driver_source() {
        let mut factory = DeviceFactory::new();
        register(&mut factory, &DeviceServices::new(std::env::temp_dir()));
        let router = Arc::new(av_core::RoutingResolver::new(
            Arc::new(DeviceRegistry::new()),
            Arc::new(av_core::TieLineCollection::new()),
        ));
        let ctx = BuildContext::new(
            router,
            Arc::new(av_core::SystemConfig::default()),
            Arc::new(BridgeJoinTables::new()),
        );

        let result = factory.build(&DeviceConfig::new("ir", "genericIrController", json!({})), &ctx);

        assert!(result.is_err());
    }
}
