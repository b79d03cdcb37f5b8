//! Presentation adapter
//!
//! Turns an extracted response into display segments: text parts as
//! markdown, code blocks as executed figures. A block that fails to run
//! becomes an error segment and rendering carries on with the rest.

use crate::execution::PlotExecutor;
use crate::extract::{ExtractedResponse, Segment};
use crate::models::{Figure, RenderedSegment};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use tracing::{debug, warn};

pub const FIGURE_MIME_TYPE: &str = "image/png";

impl Figure {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }

    /// `<img>` tag with the PNG inlined as a data URI
    pub fn to_html(&self) -> String {
        format!(
            r#"<img src="data:{};base64,{}"/>"#,
            FIGURE_MIME_TYPE,
            self.to_base64()
        )
    }

    pub fn to_segment(&self) -> RenderedSegment {
        RenderedSegment::Figure {
            mime_type: FIGURE_MIME_TYPE.to_string(),
            data: self.to_base64(),
        }
    }
}

pub struct PresentationAdapter {
    executor: Arc<dyn PlotExecutor>,
}

impl PresentationAdapter {
    pub fn new(executor: Arc<dyn PlotExecutor>) -> Self {
        Self { executor }
    }

    /// Render every segment in display order. Blocks run one at a time.
    pub async fn render(&self, extracted: &ExtractedResponse) -> Vec<RenderedSegment> {
        let mut rendered = Vec::new();

        for segment in extracted.segments() {
            match segment {
                Segment::Text(text) => rendered.push(RenderedSegment::Markdown {
                    content: text.to_string(),
                }),
                Segment::Code(block) => match self.executor.execute(&block.source).await {
                    Ok(figure) => {
                        debug!(block = block.index, bytes = figure.png.len(), "Plot rendered");
                        rendered.push(figure.to_segment());
                    }
                    Err(e) => {
                        warn!(block = block.index, error = %e, "Plot execution failed");
                        rendered.push(RenderedSegment::Error {
                            message: format!("An error occurred while generating the plot: {}", e),
                        });
                    }
                },
            }
        }

        rendered
    }
}
