pub mod frame;
pub mod scene;
pub mod text;
