pub(crate) mod encoding;
pub(crate) mod xml;
pub(crate) mod zip;
