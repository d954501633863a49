use crate::foundation::error::{Error, Result};

/// Approximate scene size, in words, used by the sentence-packing fallback.
const FALLBACK_WORDS_PER_SCENE: usize = 18;

/// Split a raw script into ordered, non-empty scene texts.
///
/// Scenes are separated by blank lines. When the script contains no blank-line
/// separator at all, the text is coarsely re-grouped at sentence boundaries
/// into scenes of roughly [`FALLBACK_WORDS_PER_SCENE`] words, so a single
/// unformatted paragraph still produces a watchable multi-scene video.
///
/// A script with zero non-empty scenes is a configuration error; an empty
/// video is never produced silently.
pub fn segment_script(text: &str) -> Result<Vec<String>> {
    let blocks: Vec<String> = split_blank_lines(text);
    let scenes = if blocks.len() > 1 || text_has_blank_separator(text) {
        blocks
    } else {
        pack_sentences(text)
    };

    if scenes.is_empty() {
        return Err(Error::config("script produced no scenes (empty input?)"));
    }
    Ok(scenes)
}

fn split_blank_lines(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !cur.trim().is_empty() {
                out.push(cur.trim().to_string());
            }
            cur.clear();
        } else {
            if !cur.is_empty() {
                cur.push('\n');
            }
            cur.push_str(line);
        }
    }
    if !cur.trim().is_empty() {
        out.push(cur.trim().to_string());
    }
    out
}

fn text_has_blank_separator(text: &str) -> bool {
    let mut seen_content = false;
    for line in text.lines() {
        if line.trim().is_empty() {
            if seen_content {
                return true;
            }
        } else {
            seen_content = true;
        }
    }
    false
}

/// Greedily pack sentences into scenes of roughly `FALLBACK_WORDS_PER_SCENE`
/// words. `?` and `!` terminate sentences like `.` does.
fn pack_sentences(text: &str) -> Vec<String> {
    let normalized = text.replace(['?', '!'], ".");
    let mut scenes = Vec::new();
    let mut buf: Vec<String> = Vec::new();
    let mut buf_words = 0usize;

    for part in normalized.split('.') {
        let sentence = part.trim();
        if sentence.is_empty() {
            continue;
        }
        buf_words += sentence.split_whitespace().count();
        buf.push(sentence.to_string());
        if buf_words >= FALLBACK_WORDS_PER_SCENE {
            scenes.push(format!("{}.", buf.join(". ")));
            buf.clear();
            buf_words = 0;
        }
    }
    if !buf.is_empty() {
        scenes.push(format!("{}.", buf.join(". ")));
    }
    scenes
}

/// Count words the way the duration estimator does.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
