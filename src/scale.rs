// 📐 Scaled-Value Check - Catch a source sending centavos as reais
// One upstream has a history of shipping values multiplied by 100. The
// pass is gated twice: a deployment has to name the suspect source, and
// the source's mean has to cross the threshold. Never unconditional,
// never applied to every source.

use anyhow::Result;

use crate::consolidate::CONSOLIDATED_TABLE;
use crate::money::format_brl;
use crate::sources::SourceTag;
use crate::store::AnalyticsStore;

pub const SCALE_FACTOR: f64 = 100.0;
pub const DEFAULT_MEAN_THRESHOLD: f64 = 1_000_000.0;

/// Table suffix for the pre-correction copy.
const PRE_CORRECTION_SUFFIX: &str = "pre_correcao";

// ============================================================================
// SCALE CHECK
// ============================================================================

pub struct ScaleCheck {
    /// Source under suspicion. None disables the pass entirely.
    pub source: Option<SourceTag>,

    /// Mean contract value that marks the batch as cents-scaled
    /// (default: R$ 1.000.000, two orders above a plausible mean)
    pub mean_threshold: f64,
}

impl ScaleCheck {
    pub fn disabled() -> Self {
        ScaleCheck {
            source: None,
            mean_threshold: DEFAULT_MEAN_THRESHOLD,
        }
    }

    pub fn for_source(source: SourceTag) -> Self {
        ScaleCheck {
            source: Some(source),
            mean_threshold: DEFAULT_MEAN_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.mean_threshold = threshold;
        self
    }

    /// Run the check against the consolidated table. The table is copied
    /// to `<name>_pre_correcao` before any value is touched.
    pub fn run(&self, store: &AnalyticsStore) -> Result<ScaleOutcome> {
        let source = match self.source {
            Some(source) => source,
            None => return Ok(ScaleOutcome::Disabled),
        };

        let mean = match store.avg_valor_by_source(source)? {
            Some(mean) => mean,
            None => return Ok(ScaleOutcome::NoRows { source }),
        };

        if mean <= self.mean_threshold {
            return Ok(ScaleOutcome::BelowThreshold { source, mean });
        }

        store.snapshot_table(CONSOLIDATED_TABLE, PRE_CORRECTION_SUFFIX)?;
        let rows = store.scale_down_source(source, SCALE_FACTOR)?;

        Ok(ScaleOutcome::Corrected {
            source,
            mean_before: mean,
            rows,
        })
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ScaleOutcome {
    /// No suspect source configured for this deployment
    Disabled,

    /// Suspect source has no consolidated rows
    NoRows { source: SourceTag },

    /// Mean within the expected range, nothing touched
    BelowThreshold { source: SourceTag, mean: f64 },

    /// Values divided by the scale factor, pre-correction copy kept
    Corrected {
        source: SourceTag,
        mean_before: f64,
        rows: usize,
    },
}

impl ScaleOutcome {
    pub fn was_corrected(&self) -> bool {
        matches!(self, ScaleOutcome::Corrected { .. })
    }

    /// Decision line for the run trace. The decision is always printed,
    /// applied or not.
    pub fn print_trace(&self) {
        match self {
            ScaleOutcome::Disabled => {
                println!("✓ Correção de escala: desativada nesta instalação");
            }
            ScaleOutcome::NoRows { source } => {
                println!(
                    "✓ Correção de escala: {} sem linhas consolidadas",
                    source.code()
                );
            }
            ScaleOutcome::BelowThreshold { source, mean } => {
                println!(
                    "✓ Correção de escala: média de {} em {} (dentro do esperado)",
                    source.code(),
                    format_brl(*mean)
                );
            }
            ScaleOutcome::Corrected {
                source,
                mean_before,
                rows,
            } => {
                println!(
                    "⚠️ Correção de escala aplicada em {}: média {} indicava centavos, {} linhas divididas por {}",
                    source.code(),
                    format_brl(*mean_before),
                    rows,
                    SCALE_FACTOR
                );
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
