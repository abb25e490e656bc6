pub mod conversion;
pub mod encryption;

pub use conversion::{
    ConversionPoller, ConversionProgress, ConversionService, ConversionTask, FileConverter,
};
pub use encryption::{EncryptionOperation, EncryptionService, StorageEncryptor};
