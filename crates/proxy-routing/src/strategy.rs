//! Per-policy choice of one member of the current tier

use crate::availability::{AvailabilityProvider, is_usable};
use crate::classify::LegClass;
use crate::element::Element;
use crate::hash::DeterministicHasher;
use crate::weighted::{RandomSource, WeightedSelector};
use tracing::debug;

/// Outcome of a choice over one tier.
///
/// `skipped` members were tried and rejected during the choice and leave the
/// pool along with `chosen`. A choice with nothing chosen sends the selection
/// on to the next tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierChoice {
    pub chosen: Option<usize>,
    pub skipped: Vec<usize>,
}

impl TierChoice {
    fn chosen(index: usize) -> Self {
        Self {
            chosen: Some(index),
            skipped: Vec::new(),
        }
    }
}

/// How a tier member is picked, with any request-derived input already resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierStrategy {
    /// First member in selection order
    First,
    /// Member at the hashed index
    Hash { key: String },
    /// Weighted random member
    Weighted,
    /// Hashed member, with availability decided by the leg class
    Correlated { key: String, leg: LegClass },
}

impl TierStrategy {
    /// Choose from `tier`, which is never empty.
    ///
    /// A lone member is returned as is, except to availability-checked legs,
    /// which never receive an unavailable next hop.
    pub fn choose(
        &self,
        tier: &[Element],
        availability: &dyn AvailabilityProvider,
        random: &mut dyn RandomSource,
    ) -> TierChoice {
        if let TierStrategy::Correlated {
            key,
            leg: LegClass::AvailabilityChecked,
        } = self
        {
            return choose_available(key, tier, availability);
        }
        if tier.len() == 1 {
            return TierChoice::chosen(0);
        }

        match self {
            TierStrategy::First => TierChoice::chosen(0),
            TierStrategy::Hash { key } => TierChoice {
                chosen: hashed(key, tier.len()),
                skipped: Vec::new(),
            },
            TierStrategy::Weighted => {
                let weights: Vec<u32> = tier.iter().map(Element::weight).collect();
                TierChoice {
                    chosen: WeightedSelector::select(&weights, random),
                    skipped: Vec::new(),
                }
            }
            TierStrategy::Correlated { key, .. } => TierChoice {
                chosen: hashed(key, tier.len()),
                skipped: Vec::new(),
            },
        }
    }
}

fn hashed(key: &str, len: usize) -> Option<usize> {
    let index = DeterministicHasher::select_index(key.as_bytes(), len);
    debug!("Hashing on {} selected index {:?} of {}", key, index, len);
    index
}

/// Rehash over the members still untested until an available one turns up
fn choose_available(key: &str, tier: &[Element], availability: &dyn AvailabilityProvider) -> TierChoice {
    let mut untested: Vec<usize> = (0..tier.len()).collect();
    let mut skipped = Vec::new();

    while let Some(position) = hashed(key, untested.len()) {
        let index = untested.remove(position);
        let element = &tier[index];
        if element.is_server_group_ref() || is_usable(availability, element) {
            return TierChoice {
                chosen: Some(index),
                skipped,
            };
        }
        debug!("{} is unavailable, rehashing over {} members", element, untested.len());
        skipped.push(index);
    }

    TierChoice {
        chosen: None,
        skipped,
    }
}
