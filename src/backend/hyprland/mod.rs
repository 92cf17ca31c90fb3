//! Hyprland backend using the `hyprland-ctm-control-v1` protocol.
//!
//! The compositor exposes a single CTM manager global. Binding it gives this
//! client exclusive control over the color transform of every output; if
//! another client already holds it, version 2 of the protocol sends a
//! `blocked` event and all further requests are ignored, which is fatal.
//!
//! ## Output tracking
//!
//! Outputs are tracked by their registry name. Outputs that appear after
//! startup are bound from the registry event and receive the last pushed
//! matrix during the next [`DisplaySync::dispatch_pending`]. Removed outputs
//! are forgotten on `global_remove`.

use anyhow::{Context, Result};
use wayland_client::{
    Connection, Dispatch, EventQueue, Proxy, QueueHandle,
    protocol::{wl_output::WlOutput, wl_registry::WlRegistry},
};

use crate::backend::{DisplaySync, ProtocolError};
use crate::color::Matrix3;
use crate::common::constants::{
    CTM_MANAGER_INTERFACE, CTM_MANAGER_MAX_VERSION, WL_OUTPUT_MAX_VERSION,
};

pub mod protocol;

use protocol::hyprland_ctm_control_manager_v1::{self, HyprlandCtmControlManagerV1};

/// A bound output and whether it still lacks the current matrix.
#[derive(Debug)]
struct OutputEntry {
    registry_name: u32,
    output: WlOutput,
    needs_apply: bool,
}

/// Event-handling state owned by the event queue.
#[derive(Debug, Default)]
struct State {
    manager: Option<HyprlandCtmControlManagerV1>,
    outputs: Vec<OutputEntry>,
    blocked: bool,
}

/// Client of the Hyprland CTM manager.
pub struct CtmBackend {
    connection: Connection,
    event_queue: EventQueue<State>,
    state: State,
    /// Last matrix staged, reapplied to hotplugged outputs.
    current: Option<Matrix3>,
}

impl CtmBackend {
    /// Connect to the compositor named by the environment and bind the CTM
    /// manager and all outputs.
    pub fn connect() -> Result<Self, ProtocolError> {
        if let Ok(desktop) = std::env::var("XDG_CURRENT_DESKTOP") {
            log_decorated!("Running on {}", desktop);
        }

        let connection =
            Connection::connect_to_env().map_err(|e| ProtocolError::Connect(e.to_string()))?;

        let mut event_queue = connection.new_event_queue();
        let qh = event_queue.handle();
        let _registry = connection.display().get_registry(&qh, ());

        let mut state = State::default();

        // First roundtrip announces the globals, the second delivers the
        // events of the objects bound in response (e.g. `blocked`)
        for _ in 0..2 {
            event_queue
                .roundtrip(&mut state)
                .map_err(|e| ProtocolError::Dispatch(e.to_string()))?;
        }

        if state.manager.is_none() {
            return Err(ProtocolError::MissingCtmManager);
        }
        if state.blocked {
            return Err(ProtocolError::Blocked);
        }

        log_decorated!("Found {} output(s)", state.outputs.len());

        Ok(Self {
            connection,
            event_queue,
            state,
            current: None,
        })
    }

    /// Handle to the underlying connection, for readiness polling.
    pub fn connection(&self) -> Connection {
        self.connection.clone()
    }

    fn manager(&self) -> Result<&HyprlandCtmControlManagerV1> {
        self.state
            .manager
            .as_ref()
            .context("CTM manager is not bound")
    }

    fn apply_to_new_outputs(&mut self) -> Result<()> {
        let Some(matrix) = self.current else {
            return Ok(());
        };

        let fresh: Vec<u32> = self
            .state
            .outputs
            .iter()
            .filter(|o| o.needs_apply)
            .map(|o| o.registry_name)
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }

        for name in fresh {
            log_decorated!("Output {} connected, applying CTM", name);
            self.set_matrix_for_output(name, &matrix)?;
        }
        self.commit()
    }
}

impl DisplaySync for CtmBackend {
    fn outputs(&self) -> Vec<u32> {
        self.state.outputs.iter().map(|o| o.registry_name).collect()
    }

    fn set_matrix_for_output(&mut self, output: u32, matrix: &Matrix3) -> Result<()> {
        let manager = self.manager()?.clone();
        let entry = self
            .state
            .outputs
            .iter_mut()
            .find(|o| o.registry_name == output)
            .with_context(|| format!("Unknown output {output}"))?;

        let m = matrix.0.map(f64::from);
        manager.set_ctm_for_output(
            &entry.output,
            m[0],
            m[1],
            m[2],
            m[3],
            m[4],
            m[5],
            m[6],
            m[7],
            m[8],
        );
        entry.needs_apply = false;
        self.current = Some(*matrix);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.manager()?.commit();
        self.connection
            .flush()
            .context("Failed to flush Wayland connection")
    }

    fn dispatch_pending(&mut self) -> Result<()> {
        self.event_queue
            .dispatch_pending(&mut self.state)
            .map_err(|e| ProtocolError::Dispatch(e.to_string()))?;

        if self.state.blocked {
            return Err(ProtocolError::Blocked.into());
        }

        self.apply_to_new_outputs()?;

        if let Err(e) = self.connection.flush() {
            log_debug!("Wayland flush after dispatch failed: {}", e);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "hyprland-ctm"
    }
}

impl Drop for CtmBackend {
    fn drop(&mut self) {
        self.state.outputs.clear();
        // Destroying the manager resets every output to identity
        if let Some(manager) = self.state.manager.take() {
            manager.destroy();
        }
        let _ = self.connection.flush();
    }
}

impl Dispatch<WlRegistry, ()> for State {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: <WlRegistry as Proxy>::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        use wayland_client::protocol::wl_registry::Event;

        match event {
            Event::Global {
                name,
                interface,
                version,
            } => {
                if interface == CTM_MANAGER_INTERFACE {
                    let target = version.min(CTM_MANAGER_MAX_VERSION);
                    log_decorated!(
                        "Found {} supported with version {}, binding to v{}",
                        CTM_MANAGER_INTERFACE,
                        version,
                        target
                    );
                    let manager =
                        registry.bind::<HyprlandCtmControlManagerV1, _, _>(name, target, qh, ());
                    state.manager = Some(manager);
                } else if interface == "wl_output" {
                    if state.outputs.iter().any(|o| o.registry_name == name) {
                        return;
                    }
                    log_debug!("Found new output with ID {}, binding", name);
                    let output = registry.bind::<WlOutput, _, _>(
                        name,
                        version.min(WL_OUTPUT_MAX_VERSION),
                        qh,
                        (),
                    );
                    state.outputs.push(OutputEntry {
                        registry_name: name,
                        output,
                        needs_apply: true,
                    });
                }
            }
            Event::GlobalRemove { name } => {
                if let Some(removed) = remove_output(&mut state.outputs, name) {
                    // wl_output.release only exists from version 3
                    if removed.output.version() >= 3 {
                        removed.output.release();
                    }
                    log_debug!("Output {} removed, {} remaining", name, state.outputs.len());
                }
            }
            _ => {}
        }
    }
}

/// Take the output registered under `registry_name` out of the list.
fn remove_output(outputs: &mut Vec<OutputEntry>, registry_name: u32) -> Option<OutputEntry> {
    let index = outputs
        .iter()
        .position(|o| o.registry_name == registry_name)?;
    Some(outputs.remove(index))
}

impl Dispatch<HyprlandCtmControlManagerV1, ()> for State {
    fn event(
        state: &mut Self,
        _: &HyprlandCtmControlManagerV1,
        event: hyprland_ctm_control_manager_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let hyprland_ctm_control_manager_v1::Event::Blocked = event {
            log_critical!("A CTM manager is already running on the current compositor.");
            state.blocked = true;
        }
    }
}

impl Dispatch<WlOutput, ()> for State {
    fn event(
        _: &mut Self,
        _: &WlOutput,
        _: <WlOutput as Proxy>::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        // Geometry and mode events are not needed
    }
}
