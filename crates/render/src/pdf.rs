//! PDFium-backed rasterizer
//!
//! Provides the production [`Rasterizer`] implementation using PDFium.

use crate::bitmap::PageSize;
use crate::rasterizer::{check_page_index, Rasterizer, RenderError, RenderResult};
use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::{PdfDocument, PdfPage, PdfRenderConfig, Pdfium};
use std::path::Path;

/// Rasterizer for one PDF document
///
/// Page sizes are read once at open time; the page count of an open
/// document never changes.
pub struct PdfiumRasterizer {
    /// The loaded PDF document (owns the Pdfium instance internally)
    document: PdfDocument<'static>,

    /// Native page sizes in points, indexed by page
    page_sizes: Vec<PageSize>,
}

impl PdfiumRasterizer {
    /// Initialize PDFium library (helper function)
    ///
    /// Search order:
    /// 1. Executable's directory (for app bundles)
    /// 2. Current working directory
    /// 3. System library paths
    fn init_pdfium() -> RenderResult<Pdfium> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()));

        if let Some(ref dir) = exe_dir {
            if let Ok(bindings) =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            {
                return Ok(Pdfium::new(bindings));
            }
        }

        Ok(Pdfium::new(
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|e| RenderError::Initialization(e.to_string()))?,
        ))
    }

    /// Open a PDF document from a file path
    pub fn open<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let pdfium = Box::leak(Box::new(Self::init_pdfium()?));

        let document = pdfium
            .load_pdf_from_file(path.as_ref(), None)
            .map_err(|e| RenderError::Load(e.to_string()))?;

        Self::from_document(document)
    }

    /// Open a PDF document from owned bytes
    pub fn from_bytes(data: Vec<u8>) -> RenderResult<Self> {
        let pdfium = Box::leak(Box::new(Self::init_pdfium()?));

        // Leak the data to get a 'static reference
        let data_static: &'static [u8] = Box::leak(data.into_boxed_slice());

        let document = pdfium
            .load_pdf_from_byte_slice(data_static, None)
            .map_err(|e| RenderError::Load(e.to_string()))?;

        Self::from_document(document)
    }

    fn from_document(document: PdfDocument<'static>) -> RenderResult<Self> {
        let page_sizes = document
            .pages()
            .iter()
            .map(|page| PageSize::new(page.width().value, page.height().value))
            .collect();

        Ok(Self {
            document,
            page_sizes,
        })
    }

    fn page(&self, page_index: usize) -> RenderResult<PdfPage<'_>> {
        check_page_index(page_index, self.page_sizes.len())?;

        let index = u16::try_from(page_index).map_err(|_| RenderError::InvalidPageIndex {
            page_index,
            page_count: self.page_sizes.len(),
        })?;

        self.document
            .pages()
            .get(index)
            .map_err(|e| RenderError::Rasterize {
                page_index,
                message: e.to_string(),
            })
    }

    fn render(&self, page_index: usize, scale: f64) -> RenderResult<DynamicImage> {
        let page = self.page(page_index)?;
        let (width, height) = self.page_sizes[page_index].pixel_dimensions(scale);

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| RenderError::Rasterize {
                page_index,
                message: e.to_string(),
            })?;

        let rendered_width = bitmap.width() as u32;
        let rendered_height = bitmap.height() as u32;
        let rgba = bitmap.as_rgba_bytes().to_vec();

        RgbaImage::from_raw(rendered_width, rendered_height, rgba)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| RenderError::Rasterize {
                page_index,
                message: format!(
                    "bitmap buffer does not match {}x{}",
                    rendered_width, rendered_height
                ),
            })
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    fn page_size(&self, page_index: usize) -> RenderResult<PageSize> {
        check_page_index(page_index, self.page_sizes.len())?;
        Ok(self.page_sizes[page_index])
    }

    fn render_page(&self, page_index: usize, scale: f64) -> RenderResult<DynamicImage> {
        self.render(page_index, scale)
    }

    fn render_thumbnail(&self, page_index: usize, scale: f64) -> RenderResult<DynamicImage> {
        self.render(page_index, scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_nonexistent_file() {
        // Fails either at PDFium binding (no library) or at load (no file)
        let result = PdfiumRasterizer::open("/nonexistent/document.pdf");
        assert!(matches!(
            result,
            Err(RenderError::Initialization(_)) | Err(RenderError::Load(_))
        ));
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let result = PdfiumRasterizer::from_bytes(b"definitely not a pdf".to_vec());
        assert!(result.is_err());
    }
}
