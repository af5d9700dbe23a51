// Git module - worktree lifecycle and synchronization services
//
// This module is split into logical submodules:
// - exec: Single chokepoint for spawning the git binary
// - utils: Common types, error handling, and repo helper queries
// - status: Porcelain status parsing
// - merge_state: In-progress merge/rebase/cherry-pick detection
// - branches: Branch and remote inventory
// - lock: Per-worktree operation serialization
// - sync: Pull-then-push cycle with conflict classification
// - push: Push with divergence handling
// - switch: Branch switching with stash-based work preservation
// - cherry_pick: Atomic multi-commit cherry-pick
// - worktree: Worktree add/remove and project-file provisioning

pub mod branches;
pub mod cherry_pick;
pub mod exec;
pub mod lock;
pub mod merge_state;
pub mod push;
pub mod status;
pub mod switch;
pub mod sync;
pub mod utils;
pub mod worktree;

pub use branches::*;
pub use cherry_pick::*;
pub use exec::*;
pub use lock::*;
pub use merge_state::*;
pub use push::*;
pub use status::*;
pub use switch::*;
pub use sync::*;
pub use utils::*;
pub use worktree::*;
