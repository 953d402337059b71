/// The canonical activation of a binary (present/absent) feature.
pub const PRESENT: f64 = 1.0;

/// A contextual predicate with its activation.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: f64,
}

impl Attribute {
    pub fn new<S: Into<String>>(name: S, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn present<S: Into<String>>(name: S) -> Self {
        Self::new(name, PRESENT)
    }
}

/// Parses `name` or `name:activation`.
///
/// Only a trailing segment that parses as a float is taken as the activation, so
/// names that themselves contain ':' survive.
impl From<&str> for Attribute {
    fn from(s: &str) -> Self {
        if let Some((name, value)) = s.rsplit_once(':') {
            if let Ok(value) = value.parse::<f64>() {
                return Self::new(name, value);
            }
        }
        Self::present(s)
    }
}

/// All attributes extracted for one token. Order is irrelevant and duplicate
/// names are additive.
pub type FeatureContext = Vec<Attribute>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_attribute() {
        assert_eq!(Attribute::from("X=dog"), Attribute::new("X=dog", 1.0));
        assert_eq!(Attribute::from("PPOS=NN:0.25"), Attribute::new("PPOS=NN", 0.25));
        assert_eq!(Attribute::from("X=a:b"), Attribute::new("X=a:b", 1.0));
    }
}
