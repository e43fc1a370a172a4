use super::{Encoder, EncoderError, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;

pub struct EnglishEncoder;

impl Encoder for EnglishEncoder {
    fn encode(&self, data: &[u8]) -> Vec<u8> {
        let words: Vec<&str> = data.iter().map(|&b| DICTIONARY[b as usize]).collect();
        words.join(" ").into_bytes()
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let text = std::str::from_utf8(data).map_err(|_| EncoderError::DecodeFailed)?;
        text.split_whitespace()
            .map(|word| {
                WORD_INDEX
                    .get(word)
                    .copied()
                    .ok_or(EncoderError::DecodeFailed)
            })
            .collect()
    }
}

lazy_static! {
    static ref WORD_INDEX: HashMap<&'static str, u8> = {
        let mut index = HashMap::with_capacity(DICTIONARY.len());
        for (value, &word) in DICTIONARY.iter().enumerate() {
            index.insert(word, value as u8);
        }
        index
    };
}

// One word per byte value; shared with the implant's encoder table.
const DICTIONARY: [&str; 256] = [
    "time", "year", "people", "way", "day", "man", "thing", "woman",
    "life", "child", "world", "school", "state", "family", "student", "group",
    "country", "problem", "hand", "part", "place", "case", "week", "company",
    "system", "program", "question", "work", "government", "number", "night", "point",
    "home", "water", "room", "mother", "area", "money", "story", "fact",
    "month", "lot", "right", "study", "book", "eye", "job", "word",
    "business", "issue", "side", "kind", "head", "house", "service", "friend",
    "father", "power", "hour", "game", "line", "end", "member", "law",
    "car", "city", "community", "name", "president", "team", "minute", "idea",
    "body", "information", "back", "parent", "face", "others", "level", "office",
    "door", "health", "person", "art", "war", "history", "party", "result",
    "change", "morning", "reason", "research", "girl", "guy", "moment", "air",
    "teacher", "force", "education", "foot", "boy", "age", "policy", "process",
    "music", "market", "sense", "nation", "plan", "college", "interest", "death",
    "experience", "effect", "use", "class", "control", "care", "field", "development",
    "role", "effort", "rate", "heart", "drug", "show", "leader", "light",
    "voice", "wife", "police", "mind", "price", "report", "decision", "son",
    "view", "relationship", "town", "road", "arm", "difference", "value", "building",
    "action", "model", "season", "society", "tax", "director", "position", "player",
    "record", "paper", "space", "ground", "form", "event", "official", "matter",
    "center", "couple", "site", "project", "activity", "star", "table", "need",
    "court", "oil", "situation", "cost", "industry", "figure", "street", "tree",
    "image", "phone", "data", "picture", "practice", "piece", "land", "product",
    "doctor", "wall", "patient", "worker", "news", "test", "movie", "north",
    "love", "support", "technology", "much", "single", "board", "kid", "summer",
    "wind", "gas", "moon", "animal", "bank", "west", "sport", "peace",
    "hope", "dinner", "garden", "yard", "risk", "sign", "sound", "south",
    "winter", "glass", "rock", "horse", "flight", "unit", "iron", "edge",
    "cell", "stone", "bridge", "snow", "salt", "river", "metal", "cloud",
    "seat", "dust", "oven", "desk", "pipe", "storm", "wheel", "forest",
    "beach", "cream", "gold", "silver", "clock", "trail", "lamp", "shelf",
    "brick", "fence", "ladder", "rope", "tent", "candle", "mirror", "basket",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_has_no_duplicates() {
        assert_eq!(WORD_INDEX.len(), 256);
    }

    #[test]
    fn test_output_is_prose() {
        let encoded = EnglishEncoder.encode(&[0, 1, 2]);
        assert_eq!(encoded, b"time year people");
    }

    #[test]
    fn test_whitespace_tolerant_decode() {
        let decoded = EnglishEncoder.decode(b"  time\n year\t\tpeople ").unwrap();
        assert_eq!(decoded, vec![0, 1, 2]);
    }

    #[test]
    fn test_unknown_word_rejected() {
        assert!(EnglishEncoder.decode(b"time warp").is_err());
    }

    #[test]
    fn test_non_utf8_rejected() {
        assert!(EnglishEncoder.decode(&[0xff, 0xfe]).is_err());
    }
}
