// Report export layout: slicing a rendered report raster across fixed-size pages.
// Rendering and PDF writing belong to the host; this computes where each page shows the raster.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Longest report we lay out; anything beyond is a broken raster, not a report.
pub const MAX_REPORT_PAGES: usize = 200;

/// Page size in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFormat {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl Default for PageFormat {
    /// A4 portrait.
    fn default() -> Self {
        PageFormat {
            width_mm: 210.0,
            height_mm: 297.0,
        }
    }
}

/// Placement of the full raster on one page. `offset_mm` is the raster's top
/// edge relative to the page top; later pages use negative offsets so the
/// next band of the raster shows through.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSlice {
    pub page_index: usize,
    pub offset_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

/// Lay out a `raster_width` x `raster_height` image scaled to the page width.
pub fn paginate(
    raster_width: u32,
    raster_height: u32,
    page: PageFormat,
) -> Result<Vec<PageSlice>, EngineError> {
    if raster_width == 0 || raster_height == 0 {
        return Err(EngineError::Export(format!(
            "empty report raster ({}x{})",
            raster_width, raster_height
        )));
    }
    if !(page.width_mm > 0.0 && page.height_mm > 0.0) {
        return Err(EngineError::Export("page size must be positive".to_string()));
    }

    let image_height = raster_height as f64 * page.width_mm / raster_width as f64;
    let slice = |page_index, offset_mm| PageSlice {
        page_index,
        offset_mm,
        width_mm: page.width_mm,
        height_mm: image_height,
    };

    let mut pages = vec![slice(0, 0.0)];
    let mut height_left = image_height - page.height_mm;
    while height_left >= 0.0 {
        if pages.len() >= MAX_REPORT_PAGES {
            return Err(EngineError::Export(format!(
                "report exceeds {} pages",
                MAX_REPORT_PAGES
            )));
        }
        pages.push(slice(pages.len(), height_left - image_height));
        height_left -= page.height_mm;
    }

    Ok(pages)
}

/// `<circuit>_Report.pdf`, with characters that break file paths replaced.
pub fn report_filename(circuit_name: &str) -> String {
    let name = circuit_name.trim();
    let name = if name.is_empty() { "Track_Analysis" } else { name };
    let safe: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{}_Report.pdf", safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_report_fits_one_page() {
        let pages = paginate(1000, 1000, PageFormat::default()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].offset_mm, 0.0);
        assert!((pages[0].height_mm - 210.0).abs() < 1e-9);
    }

    #[test]
    fn tall_report_spans_pages() {
        // 210 x 700 mm once scaled.
        let pages = paginate(300, 1000, PageFormat::default()).unwrap();
        assert_eq!(pages.len(), 3);
        let image_height = 1000.0 * 210.0 / 300.0;
        assert!((pages[1].offset_mm - (image_height - 297.0 - image_height)).abs() < 1e-9);
        assert!((pages[1].offset_mm + 297.0).abs() < 1e-9);
        assert!((pages[2].offset_mm + 594.0).abs() < 1e-9);
        assert_eq!(pages[2].page_index, 2);
    }

    #[test]
    fn exact_page_height_adds_trailing_page() {
        // Remaining height hits exactly zero, which still adds a page.
        let pages = paginate(210, 297, PageFormat::default()).unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn empty_raster_is_an_export_error() {
        assert!(matches!(
            paginate(0, 100, PageFormat::default()),
            Err(EngineError::Export(_))
        ));
    }

    #[test]
    fn page_count_is_bounded() {
        assert!(matches!(
            paginate(1, u32::MAX, PageFormat::default()),
            Err(EngineError::Export(_))
        ));
        // N whole page heights lay out as N + 1 pages.
        assert!(paginate(210, 297 * 199, PageFormat::default()).is_ok());
        assert!(paginate(210, 297 * 200, PageFormat::default()).is_err());
    }

    #[test]
    fn filename_from_circuit() {
        assert_eq!(report_filename("Suzuka"), "Suzuka_Report.pdf");
        assert_eq!(report_filename("  "), "Track_Analysis_Report.pdf");
        assert_eq!(report_filename("A/B: test"), "A_B_ test_Report.pdf");
    }
}
