//! Display synchronization: pushing a color transform matrix to every output.
//!
//! The coordinator only talks to the [`DisplaySync`] trait. The production
//! implementation is the Hyprland CTM client in [`hyprland`]; tests drive the
//! coordinator with an in-memory implementation.
//!
//! A push is always "set every output, then commit once", so the compositor
//! applies the new matrix to all outputs atomically.

use anyhow::Result;
use thiserror::Error;

use crate::color::Matrix3;

pub mod hyprland;

pub use hyprland::CtmBackend;

/// Fatal failures talking to the compositor.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Couldn't connect to a Wayland compositor: {0}")]
    Connect(String),

    #[error("Compositor doesn't support hyprland-ctm-control-v1, are you running on Hyprland?")]
    MissingCtmManager,

    #[error("A CTM manager is already running on the current compositor")]
    Blocked,

    #[error("Wayland dispatch failed: {0}")]
    Dispatch(String),
}

/// Sink for color transform matrices.
pub trait DisplaySync {
    /// Identifiers of the outputs currently known.
    fn outputs(&self) -> Vec<u32>;

    /// Stage `matrix` for one output. Takes effect on [`DisplaySync::commit`].
    fn set_matrix_for_output(&mut self, output: u32, matrix: &Matrix3) -> Result<()>;

    /// Apply everything staged since the last commit.
    fn commit(&mut self) -> Result<()>;

    /// Process compositor events that were already read from the socket.
    ///
    /// Output hotplug is handled here: a new output receives the last pushed
    /// matrix right away.
    fn dispatch_pending(&mut self) -> Result<()> {
        Ok(())
    }

    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;
}

/// Set `matrix` on every known output and commit once.
pub fn push_to_all(display: &mut dyn DisplaySync, matrix: &Matrix3) -> Result<usize> {
    let outputs = display.outputs();
    for output in &outputs {
        display.set_matrix_for_output(*output, matrix)?;
    }
    display.commit()?;
    log_debug!(
        "Pushed CTM to {} output(s) via {}: {}",
        outputs.len(),
        display.name(),
        matrix
    );
    Ok(outputs.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        outputs: Vec<u32>,
        staged: Vec<(u32, Matrix3)>,
        commits: usize,
    }

    impl DisplaySync for Recorder {
        fn outputs(&self) -> Vec<u32> {
            self.outputs.clone()
        }

        fn set_matrix_for_output(&mut self, output: u32, matrix: &Matrix3) -> Result<()> {
            self.staged.push((output, *matrix));
            Ok(())
        }

        fn commit(&mut self) -> Result<()> {
            self.commits += 1;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    #[test]
    fn test_push_sets_every_output_then_commits_once() {
        let mut display = Recorder {
            outputs: vec![3, 7],
            ..Default::default()
        };
        let matrix = Matrix3::diagonal(0.5, 0.6, 0.7);

        assert_eq!(push_to_all(&mut display, &matrix).unwrap(), 2);
        assert_eq!(display.staged, vec![(3, matrix), (7, matrix)]);
        assert_eq!(display.commits, 1);
    }

    #[test]
    fn test_push_without_outputs_still_commits() {
        let mut display = Recorder::default();
        assert_eq!(push_to_all(&mut display, &Matrix3::IDENTITY).unwrap(), 0);
        assert_eq!(display.commits, 1);
    }
}
