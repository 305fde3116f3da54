//! Content score: a rough 0..=100 grade of the fetched page.

const TITLE: &[u8] = b"<title>";
const META_DESCRIPTION: &[u8] = b"meta name=\"description\"";
const HEADING: &[u8] = b"<h1>";

pub fn content_score(status: u16, has_content_type: bool, body: &[u8]) -> u8 {
    let mut score: i32 = 100;

    if status >= 400 {
        score -= 50;
    }
    if !has_content_type {
        score -= 10;
    }

    // Markup is only judged when there is any.
    if !body.is_empty() {
        if !contains(body, TITLE) {
            score -= 20;
        }
        if !contains(body, META_DESCRIPTION) {
            score -= 15;
        }
        if !contains(body, HEADING) {
            score -= 10;
        }
    }

    u8::try_from(score.clamp(0, 100)).unwrap_or(0)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
