pub mod checksum;
pub mod fs;
pub mod keys;
pub mod process;
pub mod template;

pub use checksum::ChecksumVerifier;
pub use template::TemplateEngine;
