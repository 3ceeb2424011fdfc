//! Natural-ish page action grammar used by `browser.act` and `browser.batch`.

use std::time::Duration;

use reqwest::Url;

const MAX_WAIT: Duration = Duration::from_secs(30);

/// Grammar reminder appended to parse errors so the agent can retry.
pub const ACTION_GRAMMAR: &str = "Supported actions: `click <selector>`, `type <text> into <selector>`, \
`press <key> [on <selector>]`, `scroll up|down`, `wait <seconds>`, `go to <url>`, `back`";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// One parsed page action.
#[derive(Debug, Clone, PartialEq)]
pub enum PageAction {
    Click { selector: String },
    Type { text: String, selector: String },
    Press { key: String, selector: Option<String> },
    Scroll(ScrollDirection),
    Wait(Duration),
    Navigate { url: String },
    Back,
}

impl PageAction {
    /// Parses a single action string.
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim().trim_end_matches(['.', ',']);
        if input.is_empty() {
            return Err(format!("Empty action. {ACTION_GRAMMAR}"));
        }

        let (verb, rest) = match input.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb.to_ascii_lowercase(), rest.trim()),
            None => (input.to_ascii_lowercase(), ""),
        };

        let action = match verb.as_str() {
            "click" if !rest.is_empty() => PageAction::Click {
                selector: unquote(strip_prefix_ci(rest, "on ")).to_string(),
            },
            "type" | "fill" | "enter" => {
                let (text, selector) = rsplit_keyword(rest, " into ")
                    .or_else(|| rsplit_keyword(rest, " in "))
                    .ok_or_else(|| format!("Expected `type <text> into <selector>`. {ACTION_GRAMMAR}"))?;
                PageAction::Type {
                    text: unquote(text).to_string(),
                    selector: unquote(selector).to_string(),
                }
            }
            "press" if !rest.is_empty() => match rsplit_keyword(rest, " on ") {
                Some((key, selector)) => PageAction::Press {
                    key: normalize_key(unquote(key)),
                    selector: Some(unquote(selector).to_string()),
                },
                None => PageAction::Press {
                    key: normalize_key(unquote(rest)),
                    selector: None,
                },
            },
            "scroll" => match rest.to_ascii_lowercase().as_str() {
                "" | "down" => PageAction::Scroll(ScrollDirection::Down),
                "up" => PageAction::Scroll(ScrollDirection::Up),
                other => return Err(format!("Unknown scroll direction '{other}'. {ACTION_GRAMMAR}")),
            },
            "wait" => {
                let amount = rest
                    .trim_end_matches(|c: char| c.is_ascii_alphabetic())
                    .trim();
                let secs: f64 = amount
                    .parse()
                    .map_err(|_| format!("Expected `wait <seconds>`. {ACTION_GRAMMAR}"))?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err(format!("Invalid wait duration '{rest}'"));
                }
                PageAction::Wait(Duration::from_secs_f64(secs).min(MAX_WAIT))
            }
            "go" if rest.eq_ignore_ascii_case("back") => PageAction::Back,
            "go" | "navigate" => {
                let target = strip_prefix_ci(rest, "to ");
                if target.is_empty() {
                    return Err(format!("Expected a URL. {ACTION_GRAMMAR}"));
                }
                PageAction::Navigate {
                    url: normalize_url(unquote(target))?,
                }
            }
            "open" | "visit" if !rest.is_empty() => PageAction::Navigate {
                url: normalize_url(unquote(rest))?,
            },
            "back" if rest.is_empty() => PageAction::Back,
            "go_back" => PageAction::Back,
            _ => return Err(format!("Unrecognized action '{input}'. {ACTION_GRAMMAR}")),
        };
        Ok(action)
    }
}

/// Splits a batch description into individual steps.
///
/// Steps are separated by newlines, semicolons, or the word `then`.
/// Separators inside quoted text belong to the step.
pub fn split_steps(steps: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = steps.char_indices();

    while let Some((idx, c)) = chars.next() {
        let word_start = current.chars().last().is_none_or(char::is_whitespace);
        match quote {
            Some(open) => {
                if c == open {
                    quote = None;
                }
                current.push(c);
            }
            None if matches!(c, '"' | '\'' | '`') && word_start => {
                quote = Some(c);
                current.push(c);
            }
            None if c == '\n' || c == ';' => {
                push_step(&mut out, &current);
                current.clear();
            }
            None if word_start && is_then_at(steps, idx) => {
                push_step(&mut out, &current);
                current.clear();
                for _ in 0.."then".len() - 1 {
                    chars.next();
                }
            }
            None => current.push(c),
        }
    }
    push_step(&mut out, &current);
    out
}

/// Whether the standalone word `then` starts at byte `idx`.
fn is_then_at(steps: &str, idx: usize) -> bool {
    let Some(word) = steps.get(idx..idx + 4) else {
        return false;
    };
    word.eq_ignore_ascii_case("then")
        && steps[idx + 4..]
            .chars()
            .next()
            .is_none_or(|next| next.is_whitespace() || next == ';')
}

fn push_step(out: &mut Vec<String>, raw: &str) {
    let step = raw
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == '-')
        .trim()
        .trim_end_matches(',')
        .trim();
    let step = strip_prefix_ci(step, "and ");
    if !step.is_empty() {
        out.push(step.to_string());
    }
}

/// Adds `https://` when the agent gives a bare host, then applies the
/// same scheme rule as [`http_url`].
pub fn normalize_url(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    let url = if raw.contains("://") {
        http_url(raw)?
    } else {
        http_url(&format!("https://{raw}"))?
    };
    Ok(url.to_string())
}

/// Parses `raw`, accepting only http and https URLs.
pub fn http_url(raw: &str) -> Result<Url, String> {
    match Url::parse(raw) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(u),
        Ok(_) => Err("Only http/https URLs are supported".to_string()),
        Err(e) => Err(format!("Invalid URL: {e}")),
    }
}

fn normalize_key(key: &str) -> String {
    match key.to_ascii_lowercase().as_str() {
        "enter" | "return" => "Enter".to_string(),
        "tab" => "Tab".to_string(),
        "escape" | "esc" => "Escape".to_string(),
        "space" => " ".to_string(),
        "backspace" => "Backspace".to_string(),
        "arrowdown" | "down" => "ArrowDown".to_string(),
        "arrowup" | "up" => "ArrowUp".to_string(),
        _ => key.to_string(),
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> &'a str {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => s[prefix.len()..].trim_start(),
        _ => s,
    }
}

/// Splits on the last case-insensitive occurrence of `keyword`.
fn rsplit_keyword<'a>(s: &'a str, keyword: &str) -> Option<(&'a str, &'a str)> {
    let lower = s.to_ascii_lowercase();
    let idx = lower.rfind(keyword)?;
    let (head, tail) = (s[..idx].trim(), s[idx + keyword.len()..].trim());
    if head.is_empty() || tail.is_empty() {
        None
    } else {
        Some((head, tail))
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\'', '`'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}
