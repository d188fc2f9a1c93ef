use gantry_kube::ClusterConfig;

/// Path handling differs between ingress-nginx generations: controllers
/// newer than 0.21 take regex location paths and capture groups, older
/// ones only literal paths. Each regime knows how to build its location
/// path, its rewrite target, the snippet that tells the upstream which
/// subpath the client used, and how to read a user path back out of a
/// pattern it produced earlier.
pub trait PathAdaptor: Send + Sync {
    fn make_location_path(&self, path: &str) -> String;

    fn make_rewrite_target(&self) -> String;

    /// Snippet injecting `X-Script-Name`, the client-visible base path.
    /// `shortest_path` is the fallback for regimes that cannot recover
    /// the matched location at request time.
    fn make_configuration_snippet(&self, shortest_path: &str) -> String;

    /// Inverse of [`Self::make_location_path`]. `None` means the pattern
    /// was not produced by this adaptor.
    fn parse_location_path(&self, pattern: &str) -> Option<String>;
}

pub fn adaptor_for(config: &ClusterConfig) -> Box<dyn PathAdaptor> {
    if config.regex_paths {
        Box::new(RegexPathAdaptor {
            keep_trailing_slash: config.keep_trailing_slash,
        })
    } else {
        Box::new(PlainPathAdaptor)
    }
}

/// Regex regime. The emitted patterns guarantee three capture groups:
/// `$1$3` is the platform subpath (never empty) and `$2` is the request
/// path relative to the app root.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexPathAdaptor {
    pub keep_trailing_slash: bool,
}

impl PathAdaptor for RegexPathAdaptor {
    fn make_location_path(&self, path: &str) -> String {
        if path == "/" {
            return "/()(.*)".to_string();
        }
        let trimmed = path.trim_matches('/');
        if self.keep_trailing_slash && path.ends_with('/') {
            format!("/({trimmed})/(.*)()")
        } else {
            format!("/({trimmed})/(.*)|/({trimmed}$)")
        }
    }

    fn make_rewrite_target(&self) -> String {
        "/$2".to_string()
    }

    fn make_configuration_snippet(&self, _shortest_path: &str) -> String {
        "proxy_set_header X-Script-Name /$1$3;".to_string()
    }

    fn parse_location_path(&self, pattern: &str) -> Option<String> {
        if let Some(rest) = pattern.strip_prefix("/(") {
            if let Some(p) = rest.strip_suffix(")/(.*)()") {
                return Some(format!("/{p}/"));
            }
            if let Some(stripped) = rest.strip_suffix("$)") {
                if let Some((head, tail)) = stripped.split_once(")/(.*)|/(") {
                    if head == tail {
                        return Some(format!("/{head}"));
                    }
                }
            }
        }
        // Historical forms, read but never emitted: the literal path
        // followed by "()(.*)" or by "(/|$)(.*)". The first also covers
        // the root form "/()(.*)".
        for suffix in ["()(.*)", "(/|$)(.*)"] {
            if let Some(p) = pattern.strip_suffix(suffix) {
                return Some(if p.is_empty() {
                    "/".to_string()
                } else {
                    p.to_string()
                });
            }
        }
        None
    }
}

/// Literal-path regime for ingress-nginx <= 0.21. Controllers this old
/// predate the `$location_path` variable, so the header snippet falls
/// back to the statically known shortest path.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainPathAdaptor;

impl PathAdaptor for PlainPathAdaptor {
    fn make_location_path(&self, path: &str) -> String {
        path.to_string()
    }

    fn make_rewrite_target(&self) -> String {
        "/".to_string()
    }

    fn make_configuration_snippet(&self, shortest_path: &str) -> String {
        format!(
            "set $gantry_script_name $location_path;\n\
             if ($gantry_script_name = '') {{\n\
             \x20   set $gantry_script_name '{shortest_path}';\n\
             }}\n\
             proxy_set_header X-Script-Name $gantry_script_name;"
        )
    }

    fn parse_location_path(&self, pattern: &str) -> Option<String> {
        Some(pattern.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_root_path() {
        let adaptor = RegexPathAdaptor::default();
        assert_eq!(adaptor.make_location_path("/"), "/()(.*)");
        assert_eq!(adaptor.parse_location_path("/()(.*)").as_deref(), Some("/"));
    }

    #[test]
    fn regex_subpath_has_alternative_form() {
        let adaptor = RegexPathAdaptor::default();
        assert_eq!(
            adaptor.make_location_path("/stag--demo"),
            "/(stag--demo)/(.*)|/(stag--demo$)"
        );
        // Leading and trailing slashes do not change the pattern.
        assert_eq!(
            adaptor.make_location_path("/stag--demo/"),
            "/(stag--demo)/(.*)|/(stag--demo$)"
        );
    }

    #[test]
    fn trailing_slash_mode_keeps_the_slash() {
        let adaptor = RegexPathAdaptor {
            keep_trailing_slash: true,
        };
        assert_eq!(adaptor.make_location_path("/foo/"), "/(foo)/(.*)()");
        assert_eq!(adaptor.make_location_path("/foo"), "/(foo)/(.*)|/(foo$)");
        assert_eq!(adaptor.make_location_path("/"), "/()(.*)");
        assert_eq!(
            adaptor.parse_location_path("/(foo)/(.*)()").as_deref(),
            Some("/foo/")
        );
    }

    #[test]
    fn regex_round_trip_recovers_user_path() {
        let adaptor = RegexPathAdaptor::default();
        for path in ["/", "/foo", "/foo/bar", "/v2--default--demo"] {
            let pattern = adaptor.make_location_path(path);
            assert_eq!(adaptor.parse_location_path(&pattern).as_deref(), Some(path));
        }
    }

    #[test]
    fn regex_parses_old_literal_suffix_patterns() {
        let adaptor = RegexPathAdaptor::default();
        assert_eq!(
            adaptor.parse_location_path("/foo/()(.*)").as_deref(),
            Some("/foo/")
        );
        assert_eq!(
            adaptor.parse_location_path("/foo(/|$)(.*)").as_deref(),
            Some("/foo")
        );
        assert_eq!(
            adaptor.parse_location_path("(/|$)(.*)").as_deref(),
            Some("/")
        );
    }

    #[test]
    fn regex_rejects_foreign_patterns() {
        let adaptor = RegexPathAdaptor::default();
        assert_eq!(adaptor.parse_location_path("/plain"), None);
        assert_eq!(adaptor.parse_location_path("/(a)/(.*)|/(b$)"), None);
    }

    #[test]
    fn regex_rewrite_and_snippet_are_fixed() {
        let adaptor = RegexPathAdaptor::default();
        assert_eq!(adaptor.make_rewrite_target(), "/$2");
        assert_eq!(
            adaptor.make_configuration_snippet("/ignored"),
            "proxy_set_header X-Script-Name /$1$3;"
        );
    }

    #[test]
    fn plain_adaptor_passes_paths_through() {
        let adaptor = PlainPathAdaptor;
        assert_eq!(adaptor.make_location_path("/foo"), "/foo");
        assert_eq!(adaptor.make_rewrite_target(), "/");
        assert_eq!(adaptor.parse_location_path("/foo").as_deref(), Some("/foo"));
    }

    #[test]
    fn plain_snippet_falls_back_to_shortest_path() {
        let snippet = PlainPathAdaptor.make_configuration_snippet("/stag--demo");
        assert!(snippet.contains("$location_path"));
        assert!(snippet.contains("'/stag--demo'"));
        assert!(snippet.contains("proxy_set_header X-Script-Name"));
    }
}
