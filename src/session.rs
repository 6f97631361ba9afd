// Session: one uploaded file, its annotations, the analysis context and the analysis lifecycle.
// All mutation is synchronous; the only await is inside AnalysisJob::run, which holds no session borrow.

use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::{AnalysisBackend, AnalysisRequest, MediaPayload, TrackAnalysis};
use crate::compositor::{strip_data_uri, Compositor};
use crate::error::{AnalysisError, EngineError};
use crate::surface::{AnnotationSet, AnnotationSurface};
use crate::types::*;
use crate::upload::{media_mime, validate_upload};

/// The uploaded file as held in memory.
#[derive(Debug, Clone)]
pub struct LoadedMedia {
    pub name: String,
    pub kind: MediaKind,
    pub mime: String,
    pub bytes: Vec<u8>,
    /// Host object URL used for display; handed back for revocation when replaced.
    pub preview_url: Option<String>,
}

/// Media metadata for the UI (no bytes).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSummary {
    pub name: String,
    pub kind: MediaKind,
    pub mime: String,
    pub size: usize,
    pub preview_url: Option<String>,
}

/// Everything the UI renders, in one serializable snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub media: Option<MediaSummary>,
    pub tool_mode: ToolMode,
    pub annotations: AnnotationSet,
    pub read_only: bool,
    pub context: AnalysisContext,
    pub status: AnalysisStatus,
    pub error: Option<String>,
    pub has_analysis: bool,
    pub analysis_issues: Vec<String>,
}

/// A started analysis, detached from the session so it can be awaited without borrowing it.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    generation: u64,
    request: AnalysisRequest,
}

/// Result of running a job, to be handed back to `Session::finish_analysis`.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    generation: u64,
    pub result: Result<TrackAnalysis, AnalysisError>,
}

impl AnalysisJob {
    pub fn request(&self) -> &AnalysisRequest {
        &self.request
    }

    /// Call the backend. The selected vehicle is injected into the result.
    pub async fn run<B: AnalysisBackend>(self, backend: &B) -> AnalysisOutcome {
        let result = backend.analyze(&self.request).await.map(|mut analysis| {
            analysis.vehicle = Some(self.request.context.vehicle);
            analysis
        });
        AnalysisOutcome {
            generation: self.generation,
            result,
        }
    }
}

pub struct Session {
    config: EngineConfig,
    compositor: Compositor,
    media: Option<LoadedMedia>,
    surface: AnnotationSurface,
    context: AnalysisContext,
    status: AnalysisStatus,
    analysis: Option<TrackAnalysis>,
    error: Option<String>,
    /// Bumped whenever the media changes, so outcomes for replaced media are dropped.
    generation: u64,
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        let compositor = Compositor::new(config.compositor.clone());
        Session {
            config,
            compositor,
            media: None,
            surface: AnnotationSurface::new(),
            context: AnalysisContext::default(),
            status: AnalysisStatus::Idle,
            analysis: None,
            error: None,
            generation: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn media(&self) -> Option<&LoadedMedia> {
        self.media.as_ref()
    }

    pub fn surface(&self) -> &AnnotationSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut AnnotationSurface {
        &mut self.surface
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.context
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    pub fn analysis(&self) -> Option<&TrackAnalysis> {
        self.analysis.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Validate and take ownership of a new upload.
    ///
    /// Returns the superseded preview URL, if any, so the host can revoke it.
    /// A rejected file leaves the current session untouched apart from the error message.
    pub fn load_file(
        &mut self,
        name: &str,
        mime: &str,
        bytes: Vec<u8>,
        preview_url: Option<String>,
    ) -> Result<Option<String>, EngineError> {
        let kind = match validate_upload(name, mime, bytes.len() as u64, &self.config.upload) {
            Ok(kind) => kind,
            Err(err) => {
                self.error = Some(err.user_message());
                return Err(err);
            }
        };

        let previous = self.media.take().and_then(|m| m.preview_url);
        info!(name, ?kind, size = bytes.len(), "media loaded");

        self.media = Some(LoadedMedia {
            name: name.to_string(),
            kind,
            mime: media_mime(name, mime, kind),
            bytes,
            preview_url,
        });
        self.surface.reset();
        self.context.video_scope = VideoScope::default();
        self.status = AnalysisStatus::Idle;
        self.analysis = None;
        self.error = None;
        self.generation += 1;

        Ok(previous)
    }

    /// Drop the upload and everything derived from it. Returns the preview URL to revoke.
    pub fn clear(&mut self) -> Option<String> {
        let previous = self.media.take().and_then(|m| m.preview_url);
        self.surface.reset();
        self.context.track_name.clear();
        self.context.track_length.clear();
        self.status = AnalysisStatus::Idle;
        self.analysis = None;
        self.error = None;
        self.generation += 1;
        info!("session cleared");
        previous
    }

    pub fn set_weather(&mut self, weather: Weather) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.context.weather = weather;
        Ok(())
    }

    pub fn set_vehicle(&mut self, vehicle: Vehicle) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.context.vehicle = vehicle;
        Ok(())
    }

    pub fn set_track_name(&mut self, name: &str) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.context.track_name = name.to_string();
        Ok(())
    }

    pub fn set_track_length(&mut self, length: &str) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.context.track_length = length.to_string();
        Ok(())
    }

    pub fn set_video_scope(&mut self, scope: VideoScope) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.context.video_scope = scope;
        Ok(())
    }

    pub fn set_context(&mut self, context: AnalysisContext) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.context = context;
        Ok(())
    }

    /// Move to Running and build the request.
    ///
    /// Image uploads with annotations are composited here, before any network
    /// call. A compositing failure ends the run as Failed without calling the backend.
    pub fn begin_analysis(&mut self) -> Result<AnalysisJob, EngineError> {
        self.ensure_idle()?;
        let Some(media) = self.media.as_ref() else {
            self.error = Some(EngineError::NoMedia.user_message());
            return Err(EngineError::NoMedia);
        };

        let annotations = self.surface.snapshot();
        let payload = match media.kind {
            MediaKind::Image if !annotations.is_empty() => self
                .compositor
                .composite_to_data_uri(&media.bytes, &annotations.markers, annotations.start.as_ref())
                .map(|uri| MediaPayload::Composited {
                    base64: strip_data_uri(&uri).to_string(),
                }),
            _ => Ok(MediaPayload::Raw {
                bytes: media.bytes.clone(),
                mime: media.mime.clone(),
            }),
        };
        let markers = match media.kind {
            MediaKind::Image => annotations.markers,
            MediaKind::Video => Vec::new(),
        };
        let media_kind = media.kind;

        let media = match payload {
            Ok(media) => media,
            Err(err) => {
                warn!(error = %err, "compositing failed");
                self.status = AnalysisStatus::Failed;
                self.error = Some(err.user_message());
                self.surface.set_read_only(false);
                return Err(err);
            }
        };

        self.status = AnalysisStatus::Running;
        self.analysis = None;
        self.error = None;
        self.surface.set_read_only(true);
        info!(?media_kind, markers = markers.len(), "analysis started");

        Ok(AnalysisJob {
            generation: self.generation,
            request: AnalysisRequest {
                media,
                media_kind,
                context: self.context.clone(),
                markers,
            },
        })
    }

    /// Apply a job's outcome. Outcomes for media that has since been replaced are dropped.
    pub fn finish_analysis(&mut self, outcome: AnalysisOutcome) -> Result<(), EngineError> {
        if outcome.generation != self.generation || self.status != AnalysisStatus::Running {
            info!("stale analysis outcome dropped");
            return Ok(());
        }

        match outcome.result {
            Ok(analysis) => {
                let issues = analysis.validate();
                if !issues.is_empty() {
                    warn!(?issues, "analysis has consistency issues");
                }
                info!(circuit = %analysis.circuit_name, corners = analysis.corners.len(), "analysis succeeded");
                self.analysis = Some(analysis);
                self.status = AnalysisStatus::Succeeded;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "analysis failed");
                self.error = Some(err.user_message().to_string());
                self.status = AnalysisStatus::Failed;
                self.surface.set_read_only(false);
                Err(err.into())
            }
        }
    }

    /// Begin, run and finish in one go.
    pub async fn analyze<B: AnalysisBackend>(&mut self, backend: &B) -> Result<(), EngineError> {
        let job = self.begin_analysis()?;
        let outcome = job.run(backend).await;
        self.finish_analysis(outcome)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            media: self.media.as_ref().map(|m| MediaSummary {
                name: m.name.clone(),
                kind: m.kind,
                mime: m.mime.clone(),
                size: m.bytes.len(),
                preview_url: m.preview_url.clone(),
            }),
            tool_mode: self.surface.tool_mode(),
            annotations: self.surface.snapshot(),
            read_only: self.surface.is_read_only(),
            context: self.context.clone(),
            status: self.status,
            error: self.error.clone(),
            has_analysis: self.analysis.is_some(),
            analysis_issues: self
                .analysis
                .as_ref()
                .map(TrackAnalysis::validate)
                .unwrap_or_default(),
        }
    }

    fn ensure_idle(&self) -> Result<(), EngineError> {
        if self.status == AnalysisStatus::Running {
            return Err(EngineError::Busy);
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(EngineConfig::default())
    }
}
