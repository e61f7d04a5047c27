use lasoprinter_deeplink::{parse_link, LinkAction};
use log::{error, info, warn};

use crate::queue::QueueClosed;

/// 單一深層連結產生的列印請求。 / Ordered image references from one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintRequest {
    pub images: Vec<String>,
    pub printer: Option<String>,
}

/// 接收列印請求的目的地。 / Destination for print requests.
pub trait JobSink {
    fn submit(&self, request: PrintRequest) -> Result<(), QueueClosed>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued { images: usize },
    NoImages,
    Ignored(String),
}

/// Turns a deep link into at most one [`PrintRequest`].
/// 將深層連結轉換為列印請求。
///
/// Every failure ends up in the log; nothing is returned as an error.
pub struct DeepLinkDispatcher<S> {
    scheme: String,
    sink: S,
}

impl<S: JobSink> DeepLinkDispatcher<S> {
    pub fn new(scheme: impl Into<String>, sink: S) -> Self {
        Self {
            scheme: scheme.into(),
            sink,
        }
    }

    pub fn handle_deep_link(&self, url: &str) -> DispatchOutcome {
        let link = match parse_link(url, &self.scheme) {
            Ok(link) => link,
            Err(err) => {
                warn!("ignoring deep link: {err}");
                return DispatchOutcome::Ignored(err.to_string());
            }
        };

        if let LinkAction::Unknown(name) = &link.action {
            warn!("ignoring deep link with unknown action '{name}'");
            return DispatchOutcome::Ignored(format!("unknown action '{name}'"));
        }

        for segment in &link.undecodable {
            warn!("skipping image reference '{segment}': not valid UTF-8 once decoded");
        }

        if !link.has_images() {
            info!("deep link carries no images");
            return DispatchOutcome::NoImages;
        }

        let images = link.images.len();
        info!("queueing {images} image(s) from deep link");
        let request = PrintRequest {
            images: link.images,
            printer: link.printer,
        };
        match self.sink.submit(request) {
            Ok(()) => DispatchOutcome::Queued { images },
            Err(err) => {
                error!("could not queue print request: {err}");
                DispatchOutcome::Ignored(err.to_string())
            }
        }
    }
}
