use log::{info, warn};

use super::{Decision, ImageGate, Settled};
use crate::error::GateError;
use crate::mode::Mode;
use crate::publisher::{LocalFile, PublishedImage, ValidationState};

impl ImageGate {
    /// Screens a locally picked file and, if it passes, publishes it as the
    /// pending upload. Picking a file switches to upload mode.
    pub async fn select_file(&self, file: LocalFile) -> Settled {
        let ticket = {
            let mut state = self.lock();
            if state.closed {
                return Settled::Closed;
            }
            state.enter(Mode::Upload);
            let ticket = state.advance();

            if let Err(err) = self
                .admit(&file)
                .and_then(|()| state.publisher.show_local(&file.bytes))
            {
                warn!("Rejected {}: {}", file.name, err);
                state.publisher.reject(ValidationState::LoadError, err);
                return Settled::Applied(ValidationState::LoadError);
            }
            state.publisher.begin_loading();
            ticket
        };

        let image = match self.decoder.decode(&file.bytes).await {
            Ok(image) => image,
            Err(err) => {
                warn!("Could not decode {}: {}", file.name, err);
                return self.settle(ticket, |p| p.reject(ValidationState::LoadError, err));
            }
        };

        let decision = self.decide(self.screen(&image).await, &file.name);
        self.settle(ticket, move |p| match decision {
            Decision::Accept => {
                info!("Accepted {} as pending upload", file.name);
                p.accept(PublishedImage::PendingFile(file));
            }
            Decision::Reject(err) => p.reject(ValidationState::Blocked, err),
        })
    }

    fn admit(&self, file: &LocalFile) -> Result<(), GateError> {
        if file.is_empty() {
            return Err(GateError::SourceLoad("empty file".into()));
        }
        if let Some(mime) = &file.mime {
            if !mime.trim().to_ascii_lowercase().starts_with("image/") {
                return Err(GateError::SourceLoad(format!("not an image: {mime}")));
            }
        }
        if let Some(limit) = self.max_image_bytes {
            if file.len() > limit {
                return Err(GateError::SourceLoad(format!(
                    "{} bytes exceeds the {} byte limit",
                    file.len(),
                    limit
                )));
            }
        }
        Ok(())
    }
}
