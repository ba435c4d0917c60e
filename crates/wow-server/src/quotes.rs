//! `QuoteSource`: the external collaborator this core hands quotes off to
//! (Section 6 of the design — the real corpus is explicitly out of scope,
//! Section 1).

#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("quote source is empty")]
    Empty,
}

pub trait QuoteSource: Send + Sync {
    fn get(&self) -> Result<String, QuoteError>;
}

/// A small embedded corpus, sufficient for the core's own tests and a
/// usable default for anyone running this server standalone.
pub struct StaticQuoteSource {
    quotes: Vec<&'static str>,
}

const DEFAULT_QUOTES: &[&str] = &[
    "The only way to do great work is to love what you do.",
    "Simplicity is the ultimate sophistication.",
    "The unexamined life is not worth living.",
    "Whereof one cannot speak, thereof one must be silent.",
    "Knowing yourself is the beginning of all wisdom.",
];

impl StaticQuoteSource {
    pub fn new() -> Self {
        Self { quotes: DEFAULT_QUOTES.to_vec() }
    }
}

impl Default for StaticQuoteSource {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteSource for StaticQuoteSource {
    fn get(&self) -> Result<String, QuoteError> {
        if self.quotes.is_empty() {
            return Err(QuoteError::Empty);
        }
        let index = {
            use rand::Rng;
            rand::thread_rng().gen_range(0..self.quotes.len())
        };
        Ok(self.quotes[index].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_source_always_returns_a_non_empty_quote() {
        let source = StaticQuoteSource::new();
        for _ in 0..20 {
            let quote = source.get().expect("quote");
            assert!(!quote.is_empty());
            assert!(quote.len() <= 4 * 1024);
        }
    }

    #[test]
    fn test_empty_source_errors() {
        let source = StaticQuoteSource { quotes: Vec::new() };
        assert!(matches!(source.get(), Err(QuoteError::Empty)));
    }
}
