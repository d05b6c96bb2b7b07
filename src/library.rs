/// Book record model.
pub mod book;
/// Grid view over the library.
pub mod view;

pub use book::Book;
pub use view::{LibraryView, Tile};
