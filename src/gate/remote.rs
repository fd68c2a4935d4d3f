use log::warn;

use super::{Decision, ImageGate, Settled};
use crate::decoder::RemoteImage;
use crate::error::GateError;
use crate::mode::Mode;
use crate::publisher::{PublishedImage, ValidationState};

impl ImageGate {
    /// Handles one edit of the URL field.
    ///
    /// The text is published optimistically before anything is fetched, then
    /// withdrawn if the image turns out to be explicit or does not load. An
    /// empty text clears the image. Editing the URL switches to URL mode.
    pub async fn enter_url(&self, text: &str) -> Settled {
        let ticket = {
            let mut state = self.lock();
            if state.closed {
                return Settled::Closed;
            }
            state.enter(Mode::Url);
            let ticket = state.advance();

            if text.trim().is_empty() {
                state.publisher.clear();
                return Settled::Applied(ValidationState::Idle);
            }
            state.publisher.show_remote(text);
            state.publisher.publish(PublishedImage::Url(text.to_string()));
            state.publisher.begin_loading();
            ticket
        };

        let screened = match self.decoder.load_url(text).await {
            Ok(RemoteImage::Readable(image)) => self.screen(&image).await,
            Ok(RemoteImage::Opaque(reason)) => Err(GateError::TechnicalClassification(reason)),
            Err(err) => {
                warn!("Image at {} did not load: {}", text, err);
                return self.settle(ticket, |p| p.reject(ValidationState::LoadError, err));
            }
        };

        let decision = self.decide(screened, text);
        self.settle(ticket, |p| match decision {
            Decision::Accept => p.confirm(),
            Decision::Reject(err) => p.reject(ValidationState::Blocked, err),
        })
    }
}
