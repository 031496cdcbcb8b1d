// ABOUTME: Shared text helpers for outbound messages.
// ABOUTME: Splits long replies into platform-sized chunks at line and word boundaries.

/// Telegram's limit for a single text message (characters)
pub const MAX_MESSAGE_LENGTH: usize = 4096;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split long text into chunks of at most `max_chars` characters,
/// preferring line breaks, then word breaks, then hard splits.
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    let mut flush = |current: &mut String, current_len: &mut usize| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        current.clear();
        *current_len = 0;
    };

    for line in text.lines() {
        let line_len = char_len(line);

        // If adding this line would exceed limit, save current chunk
        if current_len > 0 && current_len + line_len + 1 > max_chars {
            flush(&mut current, &mut current_len);
        }

        if line_len <= max_chars {
            if current_len > 0 {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        // Single line too long: split at word boundaries, hard-splitting long words
        for word in line.split_whitespace() {
            let mut word = word;
            while char_len(word) > max_chars {
                if current_len > 0 {
                    flush(&mut current, &mut current_len);
                }
                let split_at = word
                    .char_indices()
                    .nth(max_chars)
                    .map(|(i, _)| i)
                    .unwrap_or(word.len());
                current.push_str(&word[..split_at]);
                flush(&mut current, &mut current_len);
                word = &word[split_at..];
            }
            let word_len = char_len(word);
            if current_len > 0 && current_len + word_len + 1 > max_chars {
                flush(&mut current, &mut current_len);
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        }
    }

    flush(&mut current, &mut current_len);
    chunks
}
