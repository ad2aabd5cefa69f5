use chrono::{Duration, Utc};
use lexicards_core::{
    daily_streak, filter_by_stage, filter_by_text, per_folder_totals, stage_counts, summarize,
    Card, CardContent, Folder, Rating, Review, Stage,
};
use std::collections::HashMap;

#[test]
fn filters_text_and_stage() {
    let folder = Folder::new("Lang");
    let mut c1 = Card::new(folder.id, CardContent::new("hola", "hello"));
    c1.content.examples = vec!["Hola, amigo".into()];
    let mut c2 = Card::new(folder.id, CardContent::new("adios", "goodbye"));
    c2.content.synonyms = "farewell".into();
    c2.schedule.last_reviewed = Some(Utc::now());
    c2.schedule.repetitions = 1;
    c2.schedule.interval_days = 1;

    let v = vec![c1.clone(), c2.clone()];

    let by_text = filter_by_text(&v, "AMIGO");
    assert_eq!(by_text.len(), 1);
    assert_eq!(by_text[0].content.word, "hola");
    assert_eq!(filter_by_text(&v, "farewell")[0].id, c2.id);
    assert_eq!(filter_by_text(&v, "  ").len(), 2);

    assert_eq!(filter_by_stage(&v, Stage::New), vec![c1]);
    assert_eq!(filter_by_stage(&v, Stage::Learning), vec![c2]);
    assert!(filter_by_stage(&v, Stage::Mature).is_empty());

    let counts = stage_counts(&v);
    assert_eq!((counts.new, counts.learning, counts.young, counts.mature), (1, 1, 0, 0));
}

#[test]
fn stats_and_streak() {
    let folder = Folder::new("Lang");
    let card = Card::new(folder.id, CardContent::new("hola", "hello"));
    let now = Utc::now();

    let r0 = Review::new(card.id, Rating::Easy, now - Duration::days(2), 1, 2.65);
    let r1 = Review::new(card.id, Rating::Good, now - Duration::days(1), 6, 2.65);
    let r2 = Review::new(card.id, Rating::Again, now, 1, 2.45);
    let all = [r0, r1, r2];

    let s = summarize(&all);
    assert_eq!(s.totals.total, 3);
    assert_eq!(s.totals.again, 1);
    assert!((s.totals.accuracy() - 2.0 / 3.0).abs() < 1e-6);
    assert_eq!(s.per_day.len(), 3);

    assert_eq!(daily_streak(&all, now.date_naive()), 3);
    assert_eq!(daily_streak(&all, (now + Duration::days(1)).date_naive()), 0);

    let map = HashMap::from([(card.id, folder.id)]);
    let per_folder = per_folder_totals(&all, &map);
    assert_eq!(per_folder[&folder.id].total, 3);
}
