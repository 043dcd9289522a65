//! Test-only helpers shared across unit tests. Not compiled into the
//! release binary.

use alloy_node_bindings::{Anvil, AnvilInstance};

/// Spawns a local Anvil instance for tests that need a live JSON-RPC
/// endpoint. The instance is killed when the returned handle is dropped.
pub fn launch_anvil() -> AnvilInstance {
    Anvil::new().try_spawn().expect("failed to spawn anvil")
}
