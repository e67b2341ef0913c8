//! ---
//! rig_section: "11-simulation"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Seed inventory for the simulated server."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use rig_client::model::props;
use rig_client::{Configuration, EntityKind};

use crate::state::SimState;

pub const PLATFORM_PLUGIN: &str = "Platforms";
pub const PERF_PLUGIN: &str = "PerfTest";
pub const LINUX_PLATFORM_TYPE: &str = "Linux";
pub const WINDOWS_PLATFORM_TYPE: &str = "Windows";
pub const SERVER_TYPE: &str = "server-omega";
pub const ALPHA_SERVICE_TYPE: &str = "service-alpha";
pub const BETA_SERVICE_TYPE: &str = "service-beta";
pub const FILE_TEMPLATE_BUNDLE: &str = "File Template Bundle";
pub const ANT_BUNDLE: &str = "Ant Bundle";

/// Operation that emits events on the target resource when it completes.
pub const CREATE_EVENTS_OPERATION: &str = "createEvents";

/// Shape of the seeded inventory.
///
/// The default yields one Linux and one Windows platform, two
/// `server-omega-N` servers on the Linux platform, and under each server
/// `service-alpha-N` and `service-beta-N` services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventorySeed {
    pub servers: usize,
    pub alpha_services: usize,
    pub beta_services: usize,
}

impl Default for InventorySeed {
    fn default() -> Self {
        Self {
            servers: 2,
            alpha_services: 5,
            beta_services: 10,
        }
    }
}

impl InventorySeed {
    pub(crate) fn apply(&self, state: &mut SimState) {
        state.add_resource_type(LINUX_PLATFORM_TYPE, PLATFORM_PLUGIN, &["discovery"]);
        state.add_resource_type(WINDOWS_PLATFORM_TYPE, PLATFORM_PLUGIN, &["discovery"]);
        state.add_resource_type(SERVER_TYPE, PERF_PLUGIN, &["restart"]);
        state.add_resource_type(
            ALPHA_SERVICE_TYPE,
            PERF_PLUGIN,
            &[CREATE_EVENTS_OPERATION, "restart"],
        );
        state.add_resource_type(
            BETA_SERVICE_TYPE,
            PERF_PLUGIN,
            &[CREATE_EVENTS_OPERATION, "restart"],
        );

        let linux = state.add_resource("platform-0", None, LINUX_PLATFORM_TYPE, PLATFORM_PLUGIN);
        state.add_resource("platform-win-0", None, WINDOWS_PLATFORM_TYPE, PLATFORM_PLUGIN);

        for server_index in 0..self.servers {
            let server = state.add_resource(
                &format!("server-omega-{server_index}"),
                Some(linux),
                SERVER_TYPE,
                PERF_PLUGIN,
            );
            for index in 0..self.alpha_services {
                let service = state.add_resource(
                    &format!("service-alpha-{index}"),
                    Some(server),
                    ALPHA_SERVICE_TYPE,
                    PERF_PLUGIN,
                );
                state.seed_configuration(
                    service,
                    Configuration::new().with("alpha-config0", "initial value"),
                    Configuration::new().with("alpha-property0", "initial value"),
                );
            }
            for index in 0..self.beta_services {
                let service = state.add_resource(
                    &format!("service-beta-{index}"),
                    Some(server),
                    BETA_SERVICE_TYPE,
                    PERF_PLUGIN,
                );
                state.seed_configuration(
                    service,
                    Configuration::new()
                        .with("beta-config0", "initial value")
                        .with("beta-config1", "initial value"),
                    Configuration::new()
                        .with("beta-property0", "initial value")
                        .with("beta-property1", "initial value"),
                );
            }
        }

        for bundle_type in [FILE_TEMPLATE_BUNDLE, ANT_BUNDLE] {
            state.add_named(EntityKind::BundleType, bundle_type, |entity| {
                entity.with_property(props::DESCRIPTION, format!("{bundle_type} handler"))
            });
        }
    }
}
