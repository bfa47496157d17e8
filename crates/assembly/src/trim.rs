use crate::error::Result;
use loreweave_protocol::{TokenCodec, TrimDirection, TrimType};
use unicode_segmentation::UnicodeSegmentation;

/// Text cut down to a token budget, with its exact cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trimmed {
    pub text: String,
    pub tokens: usize,
}

/// Fit `text` into `budget` tokens under the entry's trim policy. Tries
/// granularities coarse to fine, capped by `max_type`. `None` means the
/// text cannot fit at any permitted granularity.
pub async fn trim_to_budget(
    codec: &dyn TokenCodec,
    text: &str,
    budget: usize,
    direction: TrimDirection,
    max_type: TrimType,
) -> Result<Option<Trimmed>> {
    if budget == 0 {
        return Ok(None);
    }

    let tokens = codec.encode(text).await?;
    if tokens.len() <= budget {
        return Ok(Some(Trimmed {
            text: text.to_string(),
            tokens: tokens.len(),
        }));
    }
    if direction == TrimDirection::DoNotTrim {
        return Ok(None);
    }

    for granularity in [TrimType::Newline, TrimType::Sentence, TrimType::Token] {
        if !max_type.allows(granularity) {
            continue;
        }
        if granularity == TrimType::Token {
            let kept = match direction {
                TrimDirection::TrimTop => &tokens[tokens.len() - budget..],
                _ => &tokens[..budget],
            };
            let text = codec.decode(kept).await?;
            return Ok(Some(Trimmed {
                text,
                tokens: kept.len(),
            }));
        }
        let units = split_units(text, granularity);
        if let Some(trimmed) = trim_units(codec, &units, budget, direction).await? {
            return Ok(Some(trimmed));
        }
    }
    Ok(None)
}

fn split_units(text: &str, granularity: TrimType) -> Vec<&str> {
    match granularity {
        TrimType::Newline => text.split_inclusive('\n').collect(),
        TrimType::Sentence => text.split_sentence_bounds().collect(),
        TrimType::Token => unreachable!("token trimming never goes through units"),
    }
}

/// Drop whole units from the trimming end until the remainder fits.
async fn trim_units(
    codec: &dyn TokenCodec,
    units: &[&str],
    budget: usize,
    direction: TrimDirection,
) -> Result<Option<Trimmed>> {
    let mut lo = 0;
    let mut hi = units.len();
    while hi - lo > 1 {
        match direction {
            TrimDirection::TrimTop => lo += 1,
            _ => hi -= 1,
        }
        let candidate: String = units[lo..hi].concat();
        let cost = codec.encode(&candidate).await?.len();
        if cost <= budget {
            return Ok(Some(Trimmed {
                text: candidate,
                tokens: cost,
            }));
        }
    }
    Ok(None)
}
