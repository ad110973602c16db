pub mod registry;
pub mod upload;

pub use registry::{generate_image_id, ImageRecord, ImageRegistry};
pub use upload::{
    attach_upload, validate_upload, UploadError, UploadFile, UploadLimits, UploadService,
    UploadedImage,
};
