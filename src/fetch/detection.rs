//! Page technology detection for choosing a fetch strategy
//!
//! Detects pages whose static HTML carries little or no readable content:
//! - Single Page Application shells (React, Angular, Vue, Svelte, etc.)
//! - Bot-protection interstitials
//! - Pages whose visible text is below a threshold

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid regex"));
static NOSCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<noscript[^>]*>.*?</noscript>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static SCRIPT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<script[^>]*>").expect("valid regex"));

static SPA_ROOT_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"<app-root[^>]*>\s*</app-root>", "Angular <app-root> shell"),
        (r"<app-root[^>]*>Loading", "Angular <app-root> with loading state"),
        (r#"<div\s+id\s*=\s*["']root["'][^>]*>\s*</div>"#, "React #root shell"),
        (r#"<div\s+id\s*=\s*["']app["'][^>]*>\s*</div>"#, "React/Vue #app shell"),
        (r#"<div\s+id\s*=\s*["']__next["'][^>]*>\s*</div>"#, "Next.js #__next shell"),
        (r#"<div\s+id\s*=\s*["']__nuxt["'][^>]*>\s*</div>"#, "Nuxt #__nuxt shell"),
        (r#"<div\s+id\s*=\s*["']svelte["'][^>]*>\s*</div>"#, "Svelte #svelte shell"),
    ]
    .into_iter()
    .filter_map(|(pattern, label)| {
        Regex::new(&format!("(?i){}", pattern))
            .ok()
            .map(|re| (re, label))
    })
    .collect()
});

/// Detected page technology
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageTechnology {
    /// Server-rendered HTML
    Static,
    /// Client-rendered application shell
    Spa(SpaFramework),
    /// Anti-bot interstitial that needs a real browser
    BotProtection,
}

/// Known SPA frameworks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaFramework {
    React,
    Angular,
    Vue,
    Svelte,
    NextJs,
    Nuxt,
    Gatsby,
    Ember,
    Unknown,
}

impl std::fmt::Display for SpaFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpaFramework::React => write!(f, "React"),
            SpaFramework::Angular => write!(f, "Angular"),
            SpaFramework::Vue => write!(f, "Vue"),
            SpaFramework::Svelte => write!(f, "Svelte"),
            SpaFramework::NextJs => write!(f, "Next.js"),
            SpaFramework::Nuxt => write!(f, "Nuxt"),
            SpaFramework::Gatsby => write!(f, "Gatsby"),
            SpaFramework::Ember => write!(f, "Ember"),
            SpaFramework::Unknown => write!(f, "unknown SPA"),
        }
    }
}

/// Result of page analysis
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub technology: PageTechnology,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// Indicators that led to this conclusion
    pub indicators: Vec<String>,
    /// Visible text length in chars
    pub visible_chars: usize,
    /// Visible text bytes / total HTML bytes
    pub content_ratio: f32,
}

impl PageAnalysis {
    /// Whether the static HTML is unlikely to hold the page's real content
    pub fn is_shell(&self) -> bool {
        !matches!(self.technology, PageTechnology::Static)
    }
}

/// Decide whether a statically fetched HTML document should be re-fetched
/// with a script-executing browser.
///
/// True when the visible text is shorter than `min_text_chars` or the page
/// looks like an SPA shell or bot-protection interstitial.
pub fn needs_rendering(html: &str, min_text_chars: usize) -> bool {
    let analysis = analyze_page(html);
    analysis.visible_chars < min_text_chars || analysis.is_shell()
}

/// Visible text of an HTML document: scripts and styles removed, tags
/// replaced by spaces, whitespace collapsed
pub fn visible_text(html: &str) -> String {
    let cleaned = SCRIPT_RE.replace_all(html, "");
    let cleaned = STYLE_RE.replace_all(&cleaned, "");
    let cleaned = NOSCRIPT_RE.replace_all(&cleaned, "");
    let text_only = TAG_RE.replace_all(&cleaned, " ");
    text_only.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Analyze HTML to detect page technology
pub fn analyze_page(html: &str) -> PageAnalysis {
    let html_lower = html.to_lowercase();
    let text = visible_text(html);
    let visible_chars = text.chars().count();
    let content_ratio = if html.is_empty() {
        0.0
    } else {
        text.len() as f32 / html.len() as f32
    };

    if check_bot_protection(&html_lower) {
        return PageAnalysis {
            technology: PageTechnology::BotProtection,
            confidence: 0.9,
            indicators: vec!["Bot protection/CAPTCHA detected".to_string()],
            visible_chars,
            content_ratio,
        };
    }

    let mut indicators = Vec::new();
    let mut spa_score: f32 = 0.0;
    let mut framework = SpaFramework::Unknown;

    if content_ratio < 0.05 {
        spa_score += 0.4;
        indicators.push(format!("Very low content ratio: {:.1}%", content_ratio * 100.0));
    } else if content_ratio < 0.15 {
        spa_score += 0.2;
        indicators.push(format!("Low content ratio: {:.1}%", content_ratio * 100.0));
    }

    let roots: Vec<String> = SPA_ROOT_PATTERNS
        .iter()
        .filter(|(re, _)| re.is_match(html))
        .map(|(_, label)| label.to_string())
        .collect();
    if !roots.is_empty() {
        spa_score += 0.3;
        indicators.extend(roots);
    }

    if let Some((detected, marker)) = detect_framework(html, &html_lower) {
        framework = detected;
        spa_score += 0.2;
        indicators.push(marker.to_string());
    }

    let script_count = SCRIPT_TAG_RE.find_iter(html).count();
    if script_count > 5 {
        spa_score += 0.15;
        indicators.push(format!("Heavy JS: {} scripts", script_count));
    }

    if check_hydration_markers(&html_lower) {
        spa_score += 0.1;
        indicators.push("Client-side hydration markers".to_string());
    }

    if spa_score >= 0.5 {
        debug!(
            "SPA shell detected ({}, score {:.2}): {:?}",
            framework, spa_score, indicators
        );
        PageAnalysis {
            technology: PageTechnology::Spa(framework),
            confidence: spa_score.min(1.0),
            indicators,
            visible_chars,
            content_ratio,
        }
    } else {
        PageAnalysis {
            technology: PageTechnology::Static,
            confidence: 1.0 - spa_score,
            indicators,
            visible_chars,
            content_ratio,
        }
    }
}

fn detect_framework(html: &str, html_lower: &str) -> Option<(SpaFramework, &'static str)> {
    if html_lower.contains("ng-version") || html.contains("_ngcontent") || html.contains("_nghost")
    {
        return Some((SpaFramework::Angular, "Angular markers (ng-version, _ngcontent)"));
    }
    if html_lower.contains("__next") || html_lower.contains("_next/static") {
        return Some((SpaFramework::NextJs, "Next.js markers (__next, _next/static)"));
    }
    if html_lower.contains("__nuxt") || html_lower.contains("/_nuxt/") {
        return Some((SpaFramework::Nuxt, "Nuxt markers (__nuxt, /_nuxt/)"));
    }
    if html_lower.contains("___gatsby") || html_lower.contains("/page-data/") {
        return Some((SpaFramework::Gatsby, "Gatsby markers (___gatsby)"));
    }
    if html_lower.contains("data-reactroot") || html_lower.contains("data-reactid") {
        return Some((SpaFramework::React, "React markers (data-reactroot)"));
    }
    if html_lower.contains("data-v-") || html_lower.contains("v-cloak") {
        return Some((SpaFramework::Vue, "Vue markers (data-v-, v-cloak)"));
    }
    if html_lower.contains("svelte-") || html.contains("__svelte") {
        return Some((SpaFramework::Svelte, "Svelte markers"));
    }
    if html_lower.contains("ember-view") || html_lower.contains("data-ember") {
        return Some((SpaFramework::Ember, "Ember markers (ember-view)"));
    }
    None
}

fn check_hydration_markers(html_lower: &str) -> bool {
    const MARKERS: &[&str] = &[
        "data-server-rendered",
        "data-hydrate",
        "__preload_data__",
        "window.__initial_state__",
        "window.__state__",
        "window.__data__",
    ];
    MARKERS.iter().any(|m| html_lower.contains(m))
}

fn check_bot_protection(html_lower: &str) -> bool {
    const MARKERS: &[&str] = &[
        "captcha",
        "recaptcha",
        "hcaptcha",
        "cf-browser-verification",
        "cloudflare",
        "ddos-guard",
        "challenge-platform",
        "please wait while we verify",
        "checking your browser",
        "just a moment",
        "enable javascript and cookies",
    ];

    // Single mentions are common on ordinary pages
    MARKERS.iter().filter(|m| html_lower.contains(*m)).count() >= 2
}
