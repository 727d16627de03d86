//! 服务层：知识库检索、影像状态、医学相关性 Guard

pub mod guard;
pub mod image_handler;
pub mod knowledge_base;

pub use guard::{GuardService, GuardVerdict};
pub use image_handler::{
    decode_image, encode_for_vision, ImageHandler, ImageLoader, ImageSource, LoadedImage,
    SharedImageHandler, StoredImage,
};
pub use knowledge_base::{
    KnowledgeBaseService, KnowledgeHit, PineconeIndex, VectorIndex, VectorMatch,
};
