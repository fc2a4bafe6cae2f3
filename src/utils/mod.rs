pub mod fs_atomic;
pub mod paths;
pub mod redact;
pub mod template;
