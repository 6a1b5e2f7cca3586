pub mod extractor;
pub mod packager;

pub use extractor::IsoExtractor;
pub use packager::IsoPackager;

/// File name of the compressed boot filesystem archive inside the image.
pub(crate) const INITRD_NAME: &str = "initrd.img";
