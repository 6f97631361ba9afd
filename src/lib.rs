// track_engine: racetrack annotation, marker compositing, and AI analysis hand-off as Rust/WASM.
// JS owns the DOM and rendering; every state transition happens here and crosses the boundary as JSON.

mod analysis;
mod compositor;
mod error;
mod gemini;
mod prompt;
mod report;
mod session;
mod surface;
mod types;
mod upload;

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

pub use analysis::{
    AnalysisBackend, AnalysisRequest, BrakingZone, CornerAnalysis, MediaPayload, SectorDetail,
    SectorStats, SetupItem, SetupTrend, Strategy, TrackAnalysis,
};
pub use compositor::{strip_data_uri, to_data_uri, Compositor, MarkerPlacement};
pub use error::{AnalysisError, EngineError, ANALYSIS_FAILED_MESSAGE};
pub use gemini::{parse_response, GeminiBackend};
pub use prompt::{build_prompt, marker_hints, response_schema};
pub use report::{paginate, report_filename, PageFormat, PageSlice};
pub use session::{AnalysisJob, AnalysisOutcome, LoadedMedia, MediaSummary, Session, SessionSnapshot};
pub use surface::{remove_and_renumber, start_angle, AnnotationSet, AnnotationSurface, Interaction};
pub use types::*;
pub use upload::{media_mime, validate_upload};

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_error(err: EngineError) -> JsValue {
    JsValue::from_str(&err.user_message())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Engine interface exposed to JavaScript.
///
/// The session sits behind `Rc<RefCell<_>>` so `analyze` can hand a clone to
/// its promise; no borrow is held across the network await.
#[wasm_bindgen]
pub struct TrackEngine {
    session: Rc<RefCell<Session>>,
}

#[wasm_bindgen]
impl TrackEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<TrackEngine, JsValue> {
        let config: EngineConfig = serde_json::from_str(config_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?;

        Ok(TrackEngine {
            session: Rc::new(RefCell::new(Session::new(config))),
        })
    }

    /// Bounding client rect of the displayed image. Call on layout changes.
    pub fn set_bounds(&self, left: f64, top: f64, width: f64, height: f64) {
        self.session
            .borrow_mut()
            .surface_mut()
            .set_bounds(SurfaceRect::new(left, top, width, height));
    }

    /// `"marker"` or `"start"`.
    pub fn set_tool_mode(&self, mode: &str) -> Result<(), JsValue> {
        let mode: ToolMode = mode.parse().map_err(js_error)?;
        self.session.borrow_mut().surface_mut().set_tool_mode(mode);
        Ok(())
    }

    pub fn pointer_down_on_surface(&self, x: f64, y: f64) {
        self.session
            .borrow_mut()
            .surface_mut()
            .pointer_down_on_surface(ClientPoint::new(x, y));
    }

    /// Returns the new marker's id, if one was added.
    pub fn click_on_surface(&self, x: f64, y: f64) -> Option<u32> {
        self.session
            .borrow_mut()
            .surface_mut()
            .click_on_surface(ClientPoint::new(x, y))
    }

    pub fn pointer_down_on_marker(&self, id: u32) -> bool {
        self.session.borrow_mut().surface_mut().pointer_down_on_marker(id)
    }

    pub fn pointer_move(&self, x: f64, y: f64) -> bool {
        self.session
            .borrow_mut()
            .surface_mut()
            .pointer_move(ClientPoint::new(x, y))
    }

    pub fn pointer_up(&self) {
        self.session.borrow_mut().surface_mut().pointer_up();
    }

    pub fn right_click_on_marker(&self, id: u32) -> bool {
        self.session.borrow_mut().surface_mut().right_click_on_marker(id)
    }

    /// Load a new upload. Returns the superseded preview URL for `URL.revokeObjectURL`.
    pub fn load_file(
        &self,
        name: &str,
        mime: &str,
        bytes: Vec<u8>,
        preview_url: Option<String>,
    ) -> Result<Option<String>, JsValue> {
        self.session
            .borrow_mut()
            .load_file(name, mime, bytes, preview_url)
            .map_err(js_error)
    }

    /// Drop the upload. Returns the preview URL to revoke.
    pub fn clear(&self) -> Option<String> {
        self.session.borrow_mut().clear()
    }

    /// Replace the analysis context, e.g. `{"weather":"Wet","vehicle":"GT3","track_length":"5793"}`.
    pub fn set_context_json(&self, context_json: &str) -> Result<(), JsValue> {
        let context: AnalysisContext = serde_json::from_str(context_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid context: {}", e)))?;
        self.session
            .borrow_mut()
            .set_context(context)
            .map_err(js_error)
    }

    /// Full UI state snapshot.
    pub fn state_json(&self) -> Result<String, JsValue> {
        to_json(&self.session.borrow().snapshot())
    }

    /// Current markers and start pose only; cheap enough to call on every pointer move.
    pub fn annotations_json(&self) -> Result<String, JsValue> {
        to_json(&self.session.borrow().surface().snapshot())
    }

    pub fn analysis_json(&self) -> Result<Option<String>, JsValue> {
        let session = self.session.borrow();
        session.analysis().map(to_json).transpose()
    }

    /// Composite, send to Gemini, and resolve with the state snapshot.
    /// Rejects with a user-facing message.
    pub fn analyze(&self, api_key: String) -> js_sys::Promise {
        let session = Rc::clone(&self.session);
        future_to_promise(async move {
            let (job, settings) = {
                let mut session = session.borrow_mut();
                let job = session.begin_analysis().map_err(js_error)?;
                (job, session.config().analysis.clone())
            };

            let backend = GeminiBackend::new(api_key, settings);
            let outcome = job.run(&backend).await;

            let mut session = session.borrow_mut();
            session.finish_analysis(outcome).map_err(js_error)?;
            Ok(JsValue::from_str(&to_json(&session.snapshot())?))
        })
    }

    /// Percentage share of each sector in the estimated lap, for the telemetry bars.
    pub fn sector_shares(&self) -> Option<Vec<u8>> {
        let session = self.session.borrow();
        let stats = session.analysis()?.sector_stats.as_ref()?;
        Some(stats.shares().to_vec())
    }

    /// Page layout for a rendered report raster, as JSON `PageSlice[]` on A4.
    pub fn paginate_report(&self, raster_width: u32, raster_height: u32) -> Result<String, JsValue> {
        let pages = paginate(raster_width, raster_height, PageFormat::default()).map_err(js_error)?;
        to_json(&pages)
    }

    /// Download name for the report of the current analysis.
    pub fn report_filename(&self) -> String {
        let session = self.session.borrow();
        report_filename(
            session
                .analysis()
                .map(|a| a.circuit_name.as_str())
                .unwrap_or_default(),
        )
    }
}
