// 💰 Value Normalizer - Canonical monetary amounts from messy upstream fields
// Three dialects appear interchangeably across sources: Brazilian decimal-comma
// ("210.000,50"), plain floats (21500.0 / "1234.56"), and dot-grouped strings
// without cents ("210.000" meaning duzentos e dez mil).

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// NORMALIZED AMOUNT
// ============================================================================

/// Result of normalizing one raw monetary field.
///
/// The externally observed contract is "anything bad becomes 0.0"; callers
/// that only want the number use `value()`. The three states exist so the
/// reconciliation layer can count "no data" separately from "bad data"
/// when auditing batches with suspiciously many zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NormalizedAmount {
    /// Successfully parsed, always non-negative
    Parsed(f64),

    /// Input was null / empty / whitespace-only
    Absent,

    /// Input was present but could not be parsed as a number
    Unparseable,
}

impl NormalizedAmount {
    /// Collapse to the legacy zero-output contract: `Absent` and
    /// `Unparseable` are both exactly 0.0.
    pub fn value(&self) -> f64 {
        match self {
            NormalizedAmount::Parsed(v) => *v,
            NormalizedAmount::Absent => 0.0,
            NormalizedAmount::Unparseable => 0.0,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, NormalizedAmount::Parsed(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, NormalizedAmount::Absent)
    }

    pub fn is_unparseable(&self) -> bool {
        matches!(self, NormalizedAmount::Unparseable)
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Normalize a raw monetary field of unknown shape (null, number, or string).
///
/// JSON payloads mix all three: CRM sends strings with currency symbols,
/// the ERP sends plain floats, the legacy sheet sends whatever the last
/// intern typed in.
pub fn normalize_valor(raw: &Value) -> NormalizedAmount {
    match raw {
        Value::Null => NormalizedAmount::Absent,
        Value::Number(n) => match n.as_f64() {
            Some(v) => NormalizedAmount::Parsed(v.abs()),
            None => NormalizedAmount::Unparseable,
        },
        Value::String(s) => normalize_valor_str(s),
        // Arrays, objects, bools: upstream garbage
        _ => NormalizedAmount::Unparseable,
    }
}

/// Normalize an optional string field (CSV path: no JSON nulls there,
/// just missing or empty cells).
pub fn normalize_valor_opt(raw: Option<&str>) -> NormalizedAmount {
    match raw {
        None => NormalizedAmount::Absent,
        Some(s) => normalize_valor_str(s),
    }
}

/// String normalization, pinned to the behavior observed in production.
///
/// Dialect rules:
/// 1. `R$` / `$` and surrounding whitespace are stripped first.
/// 2. Comma present → Brazilian format: every dot collapses into the
///    integer part, the comma becomes the decimal point. Malformed
///    grouping ("1.23.4,56") is NOT rejected, it still collapses and
///    yields a number.
/// 3. No comma, at least one dot → the trailing group decides: exactly
///    three characters after the last dot means the dots are thousands
///    grouping and all of them are removed ("210.000" → 210000). Any
///    other width parses the string as-is, leaving earlier dots in
///    place, so "1.234.56" fails and collapses to zero.
/// 4. Neither → plain number parse.
///
/// The multi-dot no-comma case ("1.234.567" → 1234567) is pinned, not
/// validated as correct; do not change it without a product decision.
pub fn normalize_valor_str(raw: &str) -> NormalizedAmount {
    let limpo = raw.replace("R$", "").replace('$', "");
    let limpo = limpo.trim();

    if limpo.is_empty() {
        return NormalizedAmount::Absent;
    }

    let parsed: Option<f64> = if limpo.contains(',') {
        // Formato brasileiro: pontos são milhar, vírgula é decimal
        limpo.replace('.', "").replace(',', ".").parse::<f64>().ok()
    } else if let Some((_, cauda)) = limpo.rsplit_once('.') {
        if cauda.len() == 3 {
            // Trailing group of three → thousands grouping, drop the dots
            limpo.replace('.', "").parse::<f64>().ok()
        } else {
            limpo.parse::<f64>().ok()
        }
    } else {
        limpo.parse::<f64>().ok()
    };

    match parsed {
        Some(v) => NormalizedAmount::Parsed(v.abs()),
        None => NormalizedAmount::Unparseable,
    }
}

// ============================================================================
// DISPLAY FORMATTING
// ============================================================================

/// Format a value with Brazilian grouping: 210000.5 → "R$ 210.000,50".
///
/// Used by the report lines and by the dashboard view labels.
pub fn format_brl(valor: f64) -> String {
    let centavos = format!("{:.2}", valor.abs());
    let (inteiro, fracao) = match centavos.split_once('.') {
        Some(partes) => partes,
        None => (centavos.as_str(), "00"),
    };

    // Group the integer part in threes, right to left
    let mut agrupado = String::with_capacity(inteiro.len() + inteiro.len() / 3);
    for (i, c) in inteiro.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            agrupado.push('.');
        }
        agrupado.push(c);
    }
    let inteiro_agrupado: String = agrupado.chars().rev().collect();

    format!("R$ {},{}", inteiro_agrupado, fracao)
}

// ============================================================================
// TESTS
// ============================================================================
