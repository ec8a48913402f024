//! Question generation and distractor sampling for quiz composition

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Affix, Vocab};
use crate::fuzzy::near_duplicate;

/// Question templates the composer can emit.
///
/// `Cloze` (sentence with the word blanked out) is reserved in the data
/// model but never generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestionKind {
    WordToDefinition,
    DefinitionToWord,
    Cloze,
    AffixToMeaning,
    WordContainsAffix,
}

/// Link from a question back to the content row it was generated from.
/// Word-based and affix-based questions carry only their own id kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionSource {
    #[serde(rename = "word")]
    Word {
        #[serde(rename = "wordId")]
        word_id: i64,
    },
    #[serde(rename = "affix")]
    Affix {
        #[serde(rename = "affixId")]
        affix_id: i64,
    },
}

/// Student-facing projection of one question. Carries no answer data;
/// the correct index lives only in the quiz's answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub prompt: String,
    pub choices: Vec<String>,
    pub source: QuestionSource,
}

/// A generated question together with its private scoring data, before
/// the public/private split.
#[derive(Debug, Clone)]
pub(crate) struct ComposedQuestion {
    pub(crate) question: QuizQuestion,
    pub(crate) correct_index: usize,
    pub(crate) word_id: Option<i64>,
}

/// Sample up to 3 distinct distractors for `correct` from a same-kind pool.
///
/// Candidates that read as the correct answer, or as an already-kept
/// candidate, are excluded before sampling without replacement.
pub(crate) fn sample_distractors<R: Rng>(
    correct: &str,
    pool: &[String],
    rng: &mut R,
) -> Vec<String> {
    let mut candidates: Vec<&String> = Vec::new();
    for option in pool {
        if option.is_empty() || near_duplicate(option, correct) {
            continue;
        }
        if candidates.iter().any(|kept| near_duplicate(kept, option)) {
            continue;
        }
        candidates.push(option);
    }

    candidates
        .choose_multiple(rng, 3)
        .map(|s| (*s).clone())
        .collect()
}

/// Combine the correct answer with its distractors, shuffle uniformly,
/// and return the post-shuffle index of the correct answer.
pub(crate) fn shuffled_choices<R: Rng>(
    correct: String,
    distractors: Vec<String>,
    rng: &mut R,
) -> (Vec<String>, usize) {
    let mut choices = Vec::with_capacity(distractors.len() + 1);
    choices.push(correct);
    choices.extend(distractors);

    let correct_value = choices[0].clone();
    choices.shuffle(rng);
    let correct_index = choices.iter().position(|c| *c == correct_value).unwrap_or(0);
    (choices, correct_index)
}

/// Build one multiple-choice question for a word, choosing uniformly
/// between the two symmetric templates. Distractors come from the
/// current-week pool regardless of which week the word itself is from.
pub(crate) fn build_word_question<R: Rng>(
    word: &Vocab,
    week_vocab: &[Vocab],
    rng: &mut R,
) -> ComposedQuestion {
    let kind = if rng.gen_bool(0.5) {
        QuestionKind::WordToDefinition
    } else {
        QuestionKind::DefinitionToWord
    };

    let (prompt, correct, pool): (String, String, Vec<String>) = match kind {
        QuestionKind::WordToDefinition => (
            format!("What does \"{}\" mean?", word.word),
            word.definition.clone(),
            week_vocab
                .iter()
                .filter(|w| w.id != word.id)
                .map(|w| w.definition.clone())
                .collect(),
        ),
        _ => (
            format!("Which word means \"{}\"?", word.definition),
            word.word.clone(),
            week_vocab
                .iter()
                .filter(|w| w.id != word.id)
                .map(|w| w.word.clone())
                .collect(),
        ),
    };

    let distractors = sample_distractors(&correct, &pool, rng);
    let (choices, correct_index) = shuffled_choices(correct, distractors, rng);

    ComposedQuestion {
        question: QuizQuestion {
            id: Uuid::new_v4().to_string(),
            kind,
            prompt,
            choices,
            source: QuestionSource::Word { word_id: word.id },
        },
        correct_index,
        word_id: Some(word.id),
    }
}

/// Build one multiple-choice question for an affix.
///
/// The word-contains-affix template needs a current-week word carrying
/// the affix as a case-insensitive substring; when none exists the affix
/// is skipped entirely rather than substituting another template.
pub(crate) fn build_affix_question<R: Rng>(
    affix: &Affix,
    week_affixes: &[Affix],
    week_vocab: &[Vocab],
    rng: &mut R,
) -> Option<ComposedQuestion> {
    let kind = if rng.gen_bool(0.5) {
        QuestionKind::AffixToMeaning
    } else {
        QuestionKind::WordContainsAffix
    };

    let (prompt, correct, pool): (String, String, Vec<String>) = match kind {
        QuestionKind::AffixToMeaning => (
            format!("What does the affix \"{}\" mean?", affix.affix),
            affix.meaning.clone(),
            week_affixes
                .iter()
                .filter(|a| a.id != affix.id)
                .map(|a| a.meaning.clone())
                .collect(),
        ),
        _ => {
            let needle = affix.affix.to_lowercase();
            let carrier = week_vocab
                .iter()
                .find(|w| w.word.to_lowercase().contains(&needle))?;
            (
                format!("Which word contains the affix \"{}\"?", affix.affix),
                carrier.word.clone(),
                week_vocab
                    .iter()
                    .filter(|w| w.id != carrier.id)
                    .map(|w| w.word.clone())
                    .collect(),
            )
        }
    };

    let distractors = sample_distractors(&correct, &pool, rng);
    let (choices, correct_index) = shuffled_choices(correct, distractors, rng);

    Some(ComposedQuestion {
        question: QuizQuestion {
            id: Uuid::new_v4().to_string(),
            kind,
            prompt,
            choices,
            source: QuestionSource::Affix { affix_id: affix.id },
        },
        correct_index,
        word_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn vocab(id: i64, word: &str, definition: &str) -> Vocab {
        Vocab {
            id,
            week_id: 1,
            word: word.to_string(),
            definition: definition.to_string(),
            example_sentence: String::new(),
        }
    }

    fn affix(id: i64, affix_text: &str, meaning: &str) -> Affix {
        Affix {
            id,
            week_id: 1,
            affix: affix_text.to_string(),
            kind: "prefix".to_string(),
            meaning: meaning.to_string(),
        }
    }

    fn week_vocab() -> Vec<Vocab> {
        vec![
            vocab(1, "benevolent", "kind and generous"),
            vocab(2, "commerce", "the buying and selling of goods"),
            vocab(3, "pilgrimage", "a journey to a sacred place"),
            vocab(4, "caravan", "a group traveling together across a desert"),
            vocab(5, "prosperity", "the state of being successful"),
        ]
    }

    #[test]
    fn distractors_exclude_correct_and_cap_at_three() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool: Vec<String> = week_vocab().iter().map(|w| w.definition.clone()).collect();
        let correct = "kind and generous";

        for _ in 0..50 {
            let distractors = sample_distractors(correct, &pool, &mut rng);
            assert!(distractors.len() <= 3);
            assert!(distractors.iter().all(|d| d != correct));
        }
    }

    #[test]
    fn distractors_are_distinct() {
        let mut rng = StdRng::seed_from_u64(11);
        let pool = vec![
            "kind and generous".to_string(),
            "kind and generous ".to_string(),
            "a journey to a sacred place".to_string(),
            "the state of being successful".to_string(),
        ];
        let distractors = sample_distractors("unrelated answer", &pool, &mut rng);
        // The two near-identical definitions collapse to one candidate
        assert_eq!(distractors.len(), 3);
    }

    #[test]
    fn empty_pool_yields_no_distractors() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(sample_distractors("anything", &[], &mut rng).is_empty());
    }

    #[test]
    fn recorded_index_points_at_correct_answer_after_shuffle() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let (choices, index) = shuffled_choices(
                "correct".to_string(),
                vec!["wrong a".to_string(), "wrong b".to_string(), "wrong c".to_string()],
                &mut rng,
            );
            assert_eq!(choices.len(), 4);
            assert_eq!(choices[index], "correct");
        }
    }

    #[test]
    fn lone_correct_answer_still_forms_a_choice_list() {
        let mut rng = StdRng::seed_from_u64(1);
        let (choices, index) = shuffled_choices("only".to_string(), Vec::new(), &mut rng);
        assert_eq!(choices, vec!["only".to_string()]);
        assert_eq!(index, 0);
    }

    #[test]
    fn word_question_uses_one_of_the_two_templates() {
        let mut rng = StdRng::seed_from_u64(5);
        let pool = week_vocab();
        let mut kinds_seen = Vec::new();

        for _ in 0..40 {
            let composed = build_word_question(&pool[0], &pool, &mut rng);
            assert_eq!(composed.word_id, Some(1));
            assert_eq!(composed.question.source, QuestionSource::Word { word_id: 1 });
            match composed.question.kind {
                QuestionKind::WordToDefinition => {
                    assert_eq!(composed.question.prompt, "What does \"benevolent\" mean?");
                    assert_eq!(
                        composed.question.choices[composed.correct_index],
                        "kind and generous"
                    );
                }
                QuestionKind::DefinitionToWord => {
                    assert_eq!(
                        composed.question.prompt,
                        "Which word means \"kind and generous\"?"
                    );
                    assert_eq!(composed.question.choices[composed.correct_index], "benevolent");
                }
                other => panic!("unexpected word question kind {other:?}"),
            }
            kinds_seen.push(composed.question.kind);
        }
        // Both templates should show up over 40 draws
        assert!(kinds_seen.contains(&QuestionKind::WordToDefinition));
        assert!(kinds_seen.contains(&QuestionKind::DefinitionToWord));
    }

    #[test]
    fn affix_question_without_carrier_word_is_skipped_not_substituted() {
        let mut rng = StdRng::seed_from_u64(9);
        let affixes = vec![affix(1, "-ology", "study of"), affix(2, "xyz", "nothing")];
        let words = week_vocab();

        let mut saw_skip = false;
        let mut saw_meaning = false;
        for _ in 0..40 {
            match build_affix_question(&affixes[0], &affixes, &words, &mut rng) {
                None => saw_skip = true,
                Some(composed) => {
                    // Only the meaning template can succeed for "-ology"
                    assert_eq!(composed.question.kind, QuestionKind::AffixToMeaning);
                    assert_eq!(
                        composed.question.choices[composed.correct_index],
                        "study of"
                    );
                    assert_eq!(composed.word_id, None);
                    saw_meaning = true;
                }
            }
        }
        assert!(saw_skip);
        assert!(saw_meaning);
    }

    #[test]
    fn affix_carrier_match_is_case_insensitive() {
        let mut rng = StdRng::seed_from_u64(13);
        let affixes = vec![affix(1, "BENE", "good, well")];
        let words = week_vocab();

        let mut saw_contains = false;
        for _ in 0..40 {
            if let Some(composed) = build_affix_question(&affixes[0], &affixes, &words, &mut rng) {
                if composed.question.kind == QuestionKind::WordContainsAffix {
                    assert_eq!(
                        composed.question.choices[composed.correct_index],
                        "benevolent"
                    );
                    saw_contains = true;
                }
            }
        }
        assert!(saw_contains);
    }
}
