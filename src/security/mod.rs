//! Security policies (path containment for install roots).

pub mod path_policy;

pub use path_policy::{contain, is_under_root, normalize_path, PathPolicyViolation};
