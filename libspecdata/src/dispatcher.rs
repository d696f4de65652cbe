use super::handler::HandlerDescriptor;
use super::registry::KeyRegistry;

/// Outcome of dispatching one line
#[derive(Debug, Clone, Copy)]
pub enum Dispatch<'r> {
    Matched(&'r HandlerDescriptor),
    Unmatched,
}

impl<'r> Dispatch<'r> {
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Matched(descriptor) => Some(descriptor.key),
            Self::Unmatched => None,
        }
    }
}

/// The key token of a line: everything before the first space
pub fn line_token(line: &str) -> &str {
    match line.split_once(' ') {
        Some((token, _)) => token,
        None => line,
    }
}

/// Dispatcher finds the single handler responsible for a line.
///
/// A literal key match always wins. Otherwise handlers are tried in registration
/// order, using their custom match predicate if they have one and their key as an
/// anchored pattern if not; the first acceptance wins.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'r> {
    registry: &'r KeyRegistry,
}

impl<'r> Dispatcher<'r> {
    pub fn new(registry: &'r KeyRegistry) -> Self {
        Self { registry }
    }

    /// Dispatch one raw line
    pub fn dispatch(&self, line: &str) -> Dispatch<'r> {
        self.dispatch_token(line_token(line))
    }

    /// Dispatch an already extracted key token
    pub fn dispatch_token(&self, token: &str) -> Dispatch<'r> {
        if let Some(descriptor) = self.registry.lookup_literal(token) {
            return Dispatch::Matched(descriptor);
        }

        for handler in self.registry.handlers() {
            let accepted = match handler.descriptor.match_key {
                Some(match_key) => match_key(token),
                // Zero-width matches are rejected so a degenerate pattern cannot claim every token
                None => handler
                    .pattern
                    .find(token)
                    .is_some_and(|m| m.start() == 0 && m.end() == token.len() && !m.is_empty()),
            };
            if accepted {
                return Dispatch::Matched(&handler.descriptor);
            }
        }
        Dispatch::Unmatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::record::Record;

    fn noop(_line: &str, _record: &mut Record) -> Result<(), HandlerError> {
        Ok(())
    }

    fn registry_of(keys: &[&'static str]) -> KeyRegistry {
        let mut registry = KeyRegistry::new();
        for key in keys {
            registry
                .register(HandlerDescriptor::new(key).process(noop))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_line_token() {
        assert_eq!(line_token("#S 1 ascan"), "#S");
        assert_eq!(line_token("#XPCS"), "#XPCS");
    }

    #[test]
    fn test_anchored_match() {
        let registry = registry_of(&["#X", "#XPCS"]);
        let dispatcher = Dispatcher::new(&registry);
        assert_eq!(dispatcher.dispatch("#XPCS frame 1").key(), Some("#XPCS"));
        assert_eq!(dispatcher.dispatch("#X 1").key(), Some("#X"));

        let only_x = registry_of(&["#X"]);
        assert!(matches!(
            Dispatcher::new(&only_x).dispatch("#XPCS frame 1"),
            Dispatch::Unmatched
        ));
        let only_xpcs = registry_of(&["#XPCS"]);
        assert!(matches!(
            Dispatcher::new(&only_xpcs).dispatch("#X 1"),
            Dispatch::Unmatched
        ));
    }

    #[test]
    fn test_literal_beats_pattern() {
        // The broad pattern is registered first, but the literal key still wins
        let registry = registry_of(&["#X\\w*", "#XPCS"]);
        let dispatcher = Dispatcher::new(&registry);
        assert_eq!(dispatcher.dispatch("#XPCS a b").key(), Some("#XPCS"));
        assert_eq!(dispatcher.dispatch("#XYZ a b").key(), Some("#X\\w*"));
    }

    #[test]
    fn test_first_registered_pattern_wins() {
        let registry = registry_of(&["#V\\w+", "#VA\\d+"]);
        let dispatcher = Dispatcher::new(&registry);
        assert_eq!(dispatcher.dispatch("#VA0 foo").key(), Some("#V\\w+"));

        let registry = registry_of(&["#VA\\d+", "#V\\w+"]);
        let dispatcher = Dispatcher::new(&registry);
        assert_eq!(dispatcher.dispatch("#VA0 foo").key(), Some("#VA\\d+"));
    }

    #[test]
    fn test_zero_width_pattern_rejected() {
        let registry = registry_of(&["\\d*"]);
        let dispatcher = Dispatcher::new(&registry);
        assert!(matches!(dispatcher.dispatch_token(""), Dispatch::Unmatched));
        assert_eq!(dispatcher.dispatch_token("42").key(), Some("\\d*"));
    }

    #[test]
    fn test_custom_match_predicate() {
        fn numeric(token: &str) -> bool {
            token.parse::<f64>().is_ok()
        }
        let mut registry = KeyRegistry::new();
        registry
            .register(
                HandlerDescriptor::new("scan_data")
                    .process(noop)
                    .match_key(numeric),
            )
            .unwrap();
        let dispatcher = Dispatcher::new(&registry);
        assert_eq!(dispatcher.dispatch("43.68 0.99 12").key(), Some("scan_data"));
        assert!(matches!(dispatcher.dispatch("#Pete wrote this"), Dispatch::Unmatched));
    }

    #[test]
    fn test_builtin_keys() {
        let registry = KeyRegistry::with_builtins().unwrap();
        let dispatcher = Dispatcher::new(&registry);
        let samples = [
            ("#S 1 ascan eta 43.6355 44.0355 40 1", Some("#S")),
            ("#D Thu Jul 17 02:38:24 2003", Some("#D")),
            ("#T 1 (seconds)", Some("#T")),
            ("#G0 0 0 0 0 0 1 0 0 0 0 0 0 50 0 0 0 1 0 0 0 0", Some("#G\\d+")),
            ("#V110 101.701 56 1 4 1 1 1 1 992.253", Some("#V\\d+")),
            ("#N 14", Some("#N")),
            ("#L eta H K L elastic Kalpha Epoch seconds", Some("#L")),
            ("#o0 un0 mx my waxsx ax un5 az un7", Some("#o\\d+")),
            ("#H4 FB_o2_on FB_o2_r FB_o2_sp", Some("#H\\d+")),
            ("#VA3 foo", Some("#VA\\d+")),
            ("#@MCA 16C", Some("#@MCA")),
            ("#@CHANN 1201 1110 1200 1", Some("#@CHANN")),
            ("@A1 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0", Some("@A\\d*")),
            ("@A 0 0 0 0", Some("@A\\d*")),
            ("#@CALIB 1 2 3", Some("#@[cC][aA][lL][iI][bB]")),
            ("#@Calib 0.0501959 0.0141105 0 mca1", Some("#@[cC][aA][lL][iI][bB]")),
            ("#X 4.9 4.9", Some("#X")),
            ("#XPCS frame 1", Some("#XPCS")),
            ("#U user line", Some("#U")),
            ("#R user result", Some("#R")),
            ("#Pete wrote this stuff", None),
            ("43.6835 0.998671 -0.0100246 11.0078 1 0 66", Some("scan_data")),
        ];
        for (line, expected) in samples {
            assert_eq!(dispatcher.dispatch(line).key(), expected, "line: {line}");
        }
    }
}
