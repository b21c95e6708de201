/// Defines session phases and how they chain
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn next(&self) -> Option<Self>;

    /// Whether trials of this phase feed the results record.
    fn is_recorded(&self) -> bool;

    fn is_reading(&self) -> bool {
        false
    }
    fn is_rating(&self) -> bool {
        false
    }
    fn is_welcome(&self) -> bool {
        false
    }
    fn is_debrief(&self) -> bool {
        false
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Welcome,
    Background,
    Practice,
    Reading,
    Rating,
    Recall,
    ManipulationCheck,
    Debrief,
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Welcome
    }
}

impl Phase for SessionPhase {
    fn next(&self) -> Option<Self> {
        use SessionPhase::*;
        Some(match self {
            Welcome => Background,
            Background => Practice,
            Practice => Reading,
            Reading => Rating,
            Rating => Recall,
            Recall => ManipulationCheck,
            ManipulationCheck => Debrief,
            Debrief => return None,
        })
    }

    fn is_recorded(&self) -> bool {
        matches!(
            self,
            Self::Background
                | Self::Reading
                | Self::Rating
                | Self::Recall
                | Self::ManipulationCheck
        )
    }

    fn is_reading(&self) -> bool {
        matches!(self, Self::Practice | Self::Reading)
    }

    fn is_rating(&self) -> bool {
        matches!(self, Self::Rating | Self::ManipulationCheck)
    }

    fn is_welcome(&self) -> bool {
        matches!(self, Self::Welcome)
    }

    fn is_debrief(&self) -> bool {
        matches!(self, Self::Debrief)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_chain_ends_at_debrief() {
        let mut phase = SessionPhase::default();
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            phase = next;
            seen.push(phase);
        }
        assert_eq!(seen.len(), 8);
        assert_eq!(seen[1], SessionPhase::Background);
        assert_eq!(seen[5], SessionPhase::Recall);
        assert!(phase.is_debrief());
    }

    #[test]
    fn test_practice_is_not_recorded() {
        assert!(SessionPhase::Practice.is_reading());
        assert!(!SessionPhase::Practice.is_recorded());
        assert!(SessionPhase::Reading.is_recorded());
    }
}
