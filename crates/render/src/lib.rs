//! PDF Viewer Render Library
//!
//! Page rasterization behind the [`Rasterizer`] trait, and the shared
//! [`PageBitmap`] type the render worker hands to the page cache.

pub mod bitmap;
#[cfg(feature = "pdfium")]
pub mod pdf;
pub mod rasterizer;
pub mod solid;

pub use bitmap::{PageBitmap, PageSize, DPI_PER_INCH};
#[cfg(feature = "pdfium")]
pub use pdf::PdfiumRasterizer;
pub use rasterizer::{check_page_index, Rasterizer, RenderError, RenderResult};
pub use solid::SolidRasterizer;
