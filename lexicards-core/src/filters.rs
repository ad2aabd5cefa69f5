use crate::{Card, Stage};

pub fn filter_by_text(cards: &[Card], query: &str) -> Vec<Card> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return cards.to_vec();
    }
    cards
        .iter()
        .filter(|c| {
            let content = &c.content;
            content.word.to_lowercase().contains(&q)
                || content.meaning.to_lowercase().contains(&q)
                || content.synonyms.to_lowercase().contains(&q)
                || content
                    .examples
                    .iter()
                    .any(|e| e.to_lowercase().contains(&q))
        })
        .cloned()
        .collect()
}

pub fn filter_by_stage(cards: &[Card], want: Stage) -> Vec<Card> {
    cards
        .iter()
        .filter(|c| c.stage() == want)
        .cloned()
        .collect()
}
