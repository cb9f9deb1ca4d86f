/// Recognises crawler user agents that should not spend a provider lookup.
#[derive(Debug, Clone)]
pub struct BotFilter {
    markers: Vec<String>,
}

impl BotFilter {
    pub fn new(markers: Vec<String>) -> Self {
        Self {
            markers: markers.into_iter().filter(|m| !m.is_empty()).collect(),
        }
    }

    /// Case-sensitive substring match against every configured marker.
    pub fn is_bot(&self, user_agent: &str) -> bool {
        self.markers.iter().any(|m| user_agent.contains(m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> BotFilter {
        BotFilter::new(vec!["bot".to_string(), "ahrefs".to_string()])
    }

    #[test]
    fn test_detects_known_crawlers() {
        let filter = default_filter();
        assert!(filter.is_bot("Mozilla/5.0 (compatible; bingbot/2.0)"));
        assert!(filter.is_bot("Mozilla/5.0 (compatible; AhrefsBot/7.0; +http://ahrefs.com/robot/)"));
    }

    #[test]
    fn test_browsers_are_not_bots() {
        let filter = default_filter();
        assert!(!filter.is_bot("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0"));
        assert!(!filter.is_bot(""));
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let filter = default_filter();
        assert!(!filter.is_bot("Googlebot".to_uppercase().as_str()));
    }

    #[test]
    fn test_empty_markers_are_ignored() {
        let filter = BotFilter::new(vec![String::new()]);
        assert!(!filter.is_bot("anything"));
    }
}
