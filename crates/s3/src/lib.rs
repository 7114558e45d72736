//! shift-s3: aws-sdk-s3 implementation of the shift-core `ObjectStore`

mod client;
mod upload;

pub use client::{S3Client, to_timestamp};
pub use upload::PART_SIZE;
