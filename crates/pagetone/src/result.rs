//! Unified detection result and the external decoder seam
//!
//! Two signaling families are not detected by this crate:
//!
//! * MDC1200 data bursts
//! * DTMF (touch-tone) digits
//!
//! These are delegated to an [`ExternalDecoder`] which you supply.
//! Its records are carried through to the [`DetectionResult`]
//! untouched. A failing decoder never disturbs the tone events.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use strum::EnumMessage;
use thiserror::Error;

use crate::buffer::SampleBuffer;
use crate::event::{HiLowEvent, LongToneEvent, PulsedEvent, ToneEvent, TwoToneEvent};

/// A signal family decoded outside this crate
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::AsRefStr,
    strum_macros::EnumIter,
    strum_macros::EnumMessage,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SignalFamily {
    /// MDC1200 paging data bursts
    #[strum(detailed_message = "MDC1200 data")]
    Mdc,

    /// Touch-tone digits
    #[strum(detailed_message = "DTMF digits")]
    Dtmf,
}

impl SignalFamily {
    /// Human-readable name
    pub fn as_display_str(&self) -> &'static str {
        self.get_detailed_message().expect("missing definition")
    }
}

impl fmt::Display for SignalFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_display_str())
    }
}

/// Decodes the signal families which this crate delegates
///
/// The decoder runs on its own thread, concurrently with tone
/// detection, and must therefore be `Sync`. It is called once per
/// enabled [`SignalFamily`] with the same buffer the tone detector
/// sees. Each record it returns is passed through verbatim.
pub trait ExternalDecoder: Sync {
    /// Decode every `family` signal in `buffer`
    fn decode(
        &self,
        buffer: &SampleBuffer,
        family: SignalFamily,
    ) -> Result<Vec<Value>, DecoderError>;
}

/// External decoder failure
#[derive(Error, Debug)]
pub enum DecoderError {
    /// The family cannot be decoded here
    #[error("{0} decoding is not supported")]
    Unsupported(SignalFamily),

    /// The decoder could not be started
    #[error("unable to start decoder: {0}")]
    Spawn(#[source] std::io::Error),

    /// The decoder reported failure
    #[error("decoder exited with status {code}")]
    Exited { code: i32 },

    /// Error exchanging data with the decoder
    #[error("decoder I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The decoder's output was not understood
    #[error("decoder output is not a JSON array: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result of one external family
///
/// Serializes as the list of records, or as `{"error": "…"}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FamilyOutcome {
    /// Records from the decoder, possibly none
    Decoded(Vec<Value>),

    /// The decoder failed
    Failed {
        /// Description of the failure
        error: String,
    },
}

impl FamilyOutcome {
    /// Decoded records, or an empty slice on failure
    pub fn records(&self) -> &[Value] {
        match self {
            FamilyOutcome::Decoded(recs) => recs,
            FamilyOutcome::Failed { .. } => &[],
        }
    }

    /// True if the decoder failed
    pub fn is_err(&self) -> bool {
        matches!(self, FamilyOutcome::Failed { .. })
    }
}

impl Default for FamilyOutcome {
    fn default() -> Self {
        FamilyOutcome::Decoded(Vec::new())
    }
}

impl From<Result<Vec<Value>, DecoderError>> for FamilyOutcome {
    fn from(res: Result<Vec<Value>, DecoderError>) -> Self {
        match res {
            Ok(recs) => FamilyOutcome::Decoded(recs),
            Err(err) => FamilyOutcome::Failed {
                error: err.to_string(),
            },
        }
    }
}

/// Everything detected in one recording
///
/// Each list is in time order. The lists are independent: events
/// of different kinds never overlap, but the external families are
/// not deduplicated against the tone events.
///
/// Serializes to an object with the keys `pulsed`, `two_tone`,
/// `long_tone`, `hi_low`, `mdc`, and `dtmf`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionResult {
    /// Pulsed single tones
    pub pulsed: Vec<PulsedEvent>,

    /// Two-tone (Quick Call) pairs
    pub two_tone: Vec<TwoToneEvent>,

    /// Long tones
    pub long_tone: Vec<LongToneEvent>,

    /// Hi-low warbles
    pub hi_low: Vec<HiLowEvent>,

    /// MDC1200 records from the external decoder
    pub mdc: FamilyOutcome,

    /// DTMF records from the external decoder
    pub dtmf: FamilyOutcome,
}

impl DetectionResult {
    /// Every tone event, of every kind, in time order
    pub fn events(&self) -> Vec<ToneEvent> {
        let mut out: Vec<ToneEvent> = self
            .pulsed
            .iter()
            .cloned()
            .map(ToneEvent::from)
            .chain(self.two_tone.iter().cloned().map(ToneEvent::from))
            .chain(self.long_tone.iter().cloned().map(ToneEvent::from))
            .chain(self.hi_low.iter().cloned().map(ToneEvent::from))
            .collect();
        out.sort_by(|a, b| a.start().total_cmp(&b.start()).then(a.kind().cmp(&b.kind())));
        out
    }

    /// Number of tone events
    pub fn tone_count(&self) -> usize {
        self.pulsed.len() + self.two_tone.len() + self.long_tone.len() + self.hi_low.len()
    }

    /// Outcome of the given external family
    pub fn family(&self, family: SignalFamily) -> &FamilyOutcome {
        match family {
            SignalFamily::Mdc => &self.mdc,
            SignalFamily::Dtmf => &self.dtmf,
        }
    }

    pub(crate) fn set_family(&mut self, family: SignalFamily, outcome: FamilyOutcome) {
        match family {
            SignalFamily::Mdc => self.mdc = outcome,
            SignalFamily::Dtmf => self.dtmf = outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    use serde_json::json;

    #[test]
    fn test_family_strings() {
        assert_eq!(SignalFamily::Mdc.as_ref(), "mdc");
        assert_eq!(SignalFamily::from_str("dtmf"), Ok(SignalFamily::Dtmf));
        assert_eq!(format!("{}", SignalFamily::Mdc), "MDC1200 data");
    }

    #[test]
    fn test_outcome_serialization() {
        let ok = FamilyOutcome::from(Ok(vec![json!({"digit": "5"})]));
        assert_eq!(serde_json::to_value(&ok).expect("ser"), json!([{"digit": "5"}]));
        assert_eq!(ok.records().len(), 1);

        let failed = FamilyOutcome::from(Err(DecoderError::Exited { code: 2 }));
        assert!(failed.is_err());
        assert!(failed.records().is_empty());
        assert_eq!(
            serde_json::to_value(&failed).expect("ser"),
            json!({"error": "decoder exited with status 2"})
        );
    }

    #[test]
    fn test_result_json() {
        let mut res = DetectionResult::default();
        res.long_tone.push(LongToneEvent {
            tone_id: "lt_1".to_owned(),
            detected_freq: 1000.0,
            length: 4.0,
            start: 6.0,
            end: 10.0,
        });
        res.two_tone.push(TwoToneEvent {
            tone_id: "qc_1".to_owned(),
            freq_pair: [600.0, 900.0],
            tone_a_length: 1.0,
            tone_b_length: 3.0,
            start: 1.0,
            end: 5.0,
        });
        res.set_family(
            SignalFamily::Dtmf,
            FamilyOutcome::from(Err(DecoderError::Unsupported(SignalFamily::Dtmf))),
        );

        let js = serde_json::to_value(&res).expect("ser");
        assert_eq!(js["pulsed"], json!([]));
        assert_eq!(js["two_tone"][0]["freq_pair"], json!([600.0, 900.0]));
        assert_eq!(js["long_tone"][0]["tone_id"], json!("lt_1"));
        assert_eq!(js["mdc"], json!([]));
        assert_eq!(
            js["dtmf"],
            json!({"error": "DTMF digits decoding is not supported"})
        );

        let ids: Vec<String> = res.events().iter().map(|e| e.tone_id().to_owned()).collect();
        assert_eq!(ids, vec!["qc_1", "lt_1"]);
        assert_eq!(res.tone_count(), 2);
        assert!(res.family(SignalFamily::Dtmf).is_err());
    }
}
