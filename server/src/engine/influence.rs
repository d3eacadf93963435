/// Minimum characters for a word to count.
pub const MIN_WORD_CHARS: usize = 2;

/// Minimum counted words for a message to earn text influence.
pub const MIN_VALID_WORDS: usize = 3;

pub const TEXT_INFLUENCE: u32 = 1;
pub const IMAGE_INFLUENCE: u32 = 5;
pub const VIDEO_INFLUENCE: u32 = 10;

/// A file attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    /// MIME type as reported by the platform, if any.
    pub content_type: Option<String>,
}

impl Attachment {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }
}

/// One message-like event authored by a guild member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activity {
    pub author_is_bot: bool,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

/// Influence earned by a single activity. Pure and uncapped.
pub fn score(activity: &Activity) -> u32 {
    if activity.author_is_bot {
        return 0;
    }

    let mut influence = 0;

    let valid_words = activity
        .content
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_WORD_CHARS)
        .count();
    if valid_words >= MIN_VALID_WORDS {
        influence += TEXT_INFLUENCE;
    }

    for attachment in &activity.attachments {
        let Some(content_type) = attachment.content_type.as_deref() else {
            continue;
        };
        if content_type.contains("image") {
            influence += IMAGE_INFLUENCE;
        }
        if content_type.contains("video") {
            influence += VIDEO_INFLUENCE;
        }
    }

    influence
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> Activity {
        Activity {
            content: content.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_words_and_image() {
        let mut a = text("we hold the line");
        a.attachments.push(Attachment::new("image/png"));
        assert_eq!(score(&a), 6);
    }

    #[test]
    fn test_short_words_do_not_count() {
        assert_eq!(score(&text("a b c d e")), 0);
        assert_eq!(score(&text("ok a b go")), 0);
        assert_eq!(score(&text("ok go on")), 1);
    }

    #[test]
    fn test_video_and_multiple_attachments_add_up() {
        let a = Activity {
            content: String::new(),
            author_is_bot: false,
            attachments: vec![
                Attachment::new("video/mp4"),
                Attachment::new("image/gif"),
                Attachment::new("image/jpeg"),
                Attachment::new("application/pdf"),
                Attachment::default(),
            ],
        };
        assert_eq!(score(&a), 20);
    }

    #[test]
    fn test_bot_and_empty_score_zero() {
        let mut a = text("plenty of words in here");
        a.author_is_bot = true;
        a.attachments.push(Attachment::new("video/webm"));
        assert_eq!(score(&a), 0);
        assert_eq!(score(&Activity::default()), 0);
    }

    #[test]
    fn test_multibyte_words_count_by_chars() {
        // "é" is two bytes but one char
        assert_eq!(score(&text("é ü ñ")), 0);
        assert_eq!(score(&text("éé üü ññ")), 1);
    }
}
