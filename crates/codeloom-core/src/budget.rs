//! Token budget tracking for context composition.

/// Consume-only token budget, created per composition call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    max_tokens: usize,
    used_tokens: usize,
}

impl TokenBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            used_tokens: 0,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn used_tokens(&self) -> usize {
        self.used_tokens
    }

    pub fn remaining_tokens(&self) -> usize {
        self.max_tokens - self.used_tokens
    }

    /// Whether `estimate` fits in what remains
    pub fn fits(&self, estimate: usize) -> bool {
        estimate <= self.remaining_tokens()
    }

    /// Consume up to `tokens`, saturating at the maximum. Returns what was
    /// actually consumed.
    pub fn consume(&mut self, tokens: usize) -> usize {
        let consumed = tokens.min(self.remaining_tokens());
        self.used_tokens += consumed;
        consumed
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_tokens() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_and_remaining() {
        let mut budget = TokenBudget::new(100);
        assert!(budget.fits(100));
        assert!(!budget.fits(101));

        assert_eq!(budget.consume(40), 40);
        assert_eq!(budget.used_tokens(), 40);
        assert_eq!(budget.remaining_tokens(), 60);
        assert!(!budget.is_exhausted());
    }

    #[test]
    fn test_consume_saturates() {
        let mut budget = TokenBudget::new(10);
        assert_eq!(budget.consume(25), 10);
        assert_eq!(budget.used_tokens(), 10);
        assert!(budget.is_exhausted());
        assert_eq!(budget.consume(1), 0);
    }

    #[test]
    fn test_zero_budget() {
        let budget = TokenBudget::new(0);
        assert!(budget.is_exhausted());
        assert!(budget.fits(0));
        assert!(!budget.fits(1));
    }
}
