//! Call-leg classification for correlation-pinned routing

use crate::request::RequestView;

/// SDP media marker of the auxiliary (screen sharing) leg of a conversation
pub const APPLICATION_SHARING_MARKER: &str = "applicationsharing";

/// How a correlation-hashed leg treats destination availability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegClass {
    /// Must land where its sibling leg landed, even on an unavailable destination
    Pinned,
    /// Skips unavailable destinations like any other call
    AvailabilityChecked,
}

/// Decides whether a request is a pinned leg
pub trait LegClassifier: Send + Sync {
    fn classify(&self, request: &dyn RequestView) -> LegClass;
}

/// Pins legs whose SDP body has a media description mentioning a marker
#[derive(Debug, Clone)]
pub struct SdpMediaClassifier {
    marker: String,
}

impl SdpMediaClassifier {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    fn has_marked_media(&self, body: &str) -> bool {
        let mut in_media = false;
        for line in body.lines() {
            let line = line.trim_start();
            if line.starts_with("m=") {
                in_media = true;
            }
            if in_media && line.contains(self.marker.as_str()) {
                return true;
            }
        }
        false
    }
}

impl Default for SdpMediaClassifier {
    fn default() -> Self {
        Self::new(APPLICATION_SHARING_MARKER)
    }
}

impl LegClassifier for SdpMediaClassifier {
    fn classify(&self, request: &dyn RequestView) -> LegClass {
        match request.body() {
            Some(body) if self.has_marked_media(body) => LegClass::Pinned,
            _ => LegClass::AvailabilityChecked,
        }
    }
}

/// Treats every leg as availability-checked
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverPinned;

impl LegClassifier for NeverPinned {
    fn classify(&self, _request: &dyn RequestView) -> LegClass {
        LegClass::AvailabilityChecked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RoutingRequest;

    const AUDIO_SDP: &str = "v=0\r\n\
        o=- 20518 0 IN IP4 203.0.113.1\r\n\
        s=-\r\n\
        c=IN IP4 203.0.113.1\r\n\
        t=0 0\r\n\
        m=audio 54400 RTP/AVP 0\r\n\
        a=rtpmap:0 PCMU/8000\r\n";

    const SHARING_SDP: &str = "v=0\r\n\
        o=- 20518 0 IN IP4 203.0.113.1\r\n\
        s=-\r\n\
        t=0 0\r\n\
        m=applicationsharing 49152 TCP/DTLS/RTP/SAVP 127\r\n\
        a=connection:new\r\n";

    fn invite(body: &str) -> RoutingRequest {
        RoutingRequest::new("sip:conf@example.com").with_body(body)
    }

    #[test]
    fn test_audio_leg_is_availability_checked() {
        let classifier = SdpMediaClassifier::default();
        assert_eq!(classifier.classify(&invite(AUDIO_SDP)), LegClass::AvailabilityChecked);
    }

    #[test]
    fn test_sharing_leg_is_pinned() {
        let classifier = SdpMediaClassifier::default();
        assert_eq!(classifier.classify(&invite(SHARING_SDP)), LegClass::Pinned);
    }

    #[test]
    fn test_marker_outside_media_description_is_ignored() {
        let classifier = SdpMediaClassifier::default();
        let body = "v=0\r\ns=applicationsharing session\r\nm=audio 5000 RTP/AVP 0\r\n";
        assert_eq!(classifier.classify(&invite(body)), LegClass::AvailabilityChecked);
    }

    #[test]
    fn test_marker_in_media_attributes() {
        let classifier = SdpMediaClassifier::default();
        let body = "v=0\r\nm=application 5000 TCP 0\r\na=x-type:applicationsharing\r\n";
        assert_eq!(classifier.classify(&invite(body)), LegClass::Pinned);
    }

    #[test]
    fn test_no_body() {
        let classifier = SdpMediaClassifier::default();
        let request = RoutingRequest::new("sip:conf@example.com");
        assert_eq!(classifier.classify(&request), LegClass::AvailabilityChecked);
        assert_eq!(NeverPinned.classify(&invite(SHARING_SDP)), LegClass::AvailabilityChecked);
    }

    #[test]
    fn test_custom_marker() {
        let classifier = SdpMediaClassifier::new("video");
        let body = "v=0\r\nm=video 5002 RTP/AVP 96\r\n";
        assert_eq!(classifier.classify(&invite(body)), LegClass::Pinned);
    }
}
