//! Advertisement filtering
//!
//! Toys advertise a local name made of a model prefix and a short id,
//! e.g. `SM-1A2B` for a Sphero Mini.

/// A toy model recognised by its advertised name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToyAdvertisement {
    pub name: &'static str,
    pub prefix: &'static str,
}

/// Models this driver can talk to
pub const KNOWN_TOYS: &[ToyAdvertisement] = &[ToyAdvertisement {
    name: "Sphero Mini",
    prefix: "SM-",
}];

/// Find the known model an advertised name belongs to
pub fn match_advertisement(local_name: &str) -> Option<&'static ToyAdvertisement> {
    KNOWN_TOYS
        .iter()
        .find(|toy| local_name.starts_with(toy.prefix))
}

/// True if the name starts with any of the prefixes
pub fn matches_prefix<S: AsRef<str>>(local_name: &str, prefixes: &[S]) -> bool {
    prefixes.iter().any(|p| local_name.starts_with(p.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_toy_matches_prefix() {
        let toy = match_advertisement("SM-7C31").unwrap();
        assert_eq!(toy.name, "Sphero Mini");
        assert!(match_advertisement("BB-8 1234").is_none());
        assert!(match_advertisement("xSM-7C31").is_none());
        assert!(match_advertisement("").is_none());
    }

    #[test]
    fn custom_prefixes() {
        let prefixes = vec!["SM-".to_string(), "LM-".to_string()];
        assert!(matches_prefix("LM-0001", &prefixes));
        assert!(!matches_prefix("BB-0001", &prefixes));
        assert!(!matches_prefix::<&str>("SM-0001", &[]));
    }
}
