//! Document type classification and learning objective extraction.

use std::sync::LazyLock;

use regex::Regex;

use super::AnalysisOptions;
use crate::model::{DocumentType, Question};

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•·▪]|\d{1,2}[.)、]|[a-z][.)]|[（(]\d{1,2}[)）])\s*").expect("valid regex")
});

/// Keyword groups in priority order. The first group with a hit decides.
const TYPE_KEYWORDS: &[(DocumentType, &[&str])] = &[
    (
        DocumentType::Syllabus,
        &["syllabus", "course outline", "課程大綱", "教學大綱"],
    ),
    (
        DocumentType::Exam,
        &["exam", "quiz", "test", "midterm", "final examination", "考試", "測驗", "期中考", "期末考"],
    ),
    (
        DocumentType::Worksheet,
        &["worksheet", "exercise", "practice", "練習", "作業", "學習單"],
    ),
    (
        DocumentType::LessonPlan,
        &["lesson plan", "teaching plan", "教案", "課程計劃", "教學計畫"],
    ),
    (
        DocumentType::LectureNotes,
        &["lecture", "lecture notes", "講義"],
    ),
];

/// Terms that turn a question-heavy document into an exam.
const GRADING_TERMS: &[&str] = &["grade", "score", "points", "time limit", "評分", "成績", "時間限制", "配分"];

const OBJECTIVE_MARKERS: &[&str] = &[
    "learning objectives",
    "teaching objectives",
    "course objectives",
    "learning outcomes",
    "objectives",
    "students will be able to",
    "students will",
    "this course aims to",
    "學習目標",
    "教學目標",
    "課程目標",
    "學生將能夠",
    "學習成果",
    "本課程旨在",
];

/// Classify a document from its text and extracted questions.
pub fn classify_document(
    text: &str,
    questions: &[Question],
    options: &AnalysisOptions,
) -> DocumentType {
    let lower = text.to_lowercase();

    for (doc_type, keywords) in TYPE_KEYWORDS {
        if let Some(term) = keywords.iter().find(|k| contains_term(&lower, k)) {
            log::debug!("classified as {} by keyword '{}'", doc_type, term);
            return *doc_type;
        }
    }

    if questions.len() >= options.multiple_questions_threshold {
        return if GRADING_TERMS.iter().any(|k| contains_term(&lower, k)) {
            DocumentType::Exam
        } else {
            DocumentType::Worksheet
        };
    }

    DocumentType::Unknown
}

/// Whether `term` occurs in `text` as a whole word.
///
/// Latin terms must not be glued to other letters, except for a plural `s`.
/// CJK terms match anywhere.
fn contains_term(text: &str, term: &str) -> bool {
    if !term.is_ascii() {
        return text.contains(term);
    }

    text.match_indices(term).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = &text[start + term.len()..];
        let after = after.strip_prefix('s').unwrap_or(after);
        let boundary = |c: Option<char>| c.map_or(true, |c| !c.is_ascii_alphanumeric());
        boundary(before) && boundary(after.chars().next())
    })
}

/// Collect learning objectives listed after an objective marker.
///
/// The block runs from the first marker to the next blank line. Text after
/// the marker on the same line counts as an objective when present.
pub fn extract_learning_objectives(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let lower = line.to_lowercase();
        let Some((marker, pos)) = OBJECTIVE_MARKERS
            .iter()
            .find_map(|m| lower.find(m).map(|pos| (*m, pos)))
        else {
            continue;
        };

        let mut objectives = Vec::new();
        let rest = lower[pos + marker.len()..]
            .trim_start_matches([':', '：', ' ', '-', '、'])
            .trim();
        if !rest.is_empty() {
            objectives.push(clean_item(original_tail(line, rest)));
        }

        for next in &lines[i + 1..] {
            if next.trim().is_empty() {
                break;
            }
            let item = clean_item(next);
            if !item.is_empty() {
                objectives.push(item);
            }
        }

        objectives.retain(|o| !o.is_empty());
        return objectives;
    }

    Vec::new()
}

/// Portion of `line` corresponding to the lowercased `tail`, which keeps
/// the original casing.
fn original_tail<'a>(line: &'a str, tail: &str) -> &'a str {
    let line = line.trim_end();
    let chars = tail.chars().count();
    let start = line
        .char_indices()
        .rev()
        .nth(chars.saturating_sub(1))
        .map_or(0, |(i, _)| i);
    &line[start..]
}

fn clean_item(line: &str) -> String {
    LIST_MARKER.replace(line, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn questions(n: usize) -> Vec<Question> {
        (1..=n).map(|i| Question::new(i.to_string(), "q")).collect()
    }

    #[test]
    fn test_keyword_priority() {
        let options = AnalysisOptions::default();
        assert_eq!(
            classify_document("Biology Syllabus\nWeek 1 quiz", &[], &options),
            DocumentType::Syllabus
        );
        assert_eq!(
            classify_document("Unit 3 Quiz", &[], &options),
            DocumentType::Exam
        );
        assert_eq!(
            classify_document("數學練習", &[], &options),
            DocumentType::Worksheet
        );
        assert_eq!(
            classify_document("Lecture 4: Thermodynamics", &[], &options),
            DocumentType::LectureNotes
        );
    }

    #[test]
    fn test_whole_word_matching() {
        assert!(contains_term("the final test", "test"));
        assert!(contains_term("two tests.", "test"));
        assert!(!contains_term("the latest contest", "test"));
        assert!(!contains_term("examine this", "exam"));
        assert!(contains_term("本次考試", "考試"));
    }

    #[test]
    fn test_question_count_fallback() {
        let options = AnalysisOptions::default();
        assert_eq!(
            classify_document("Answer all.", &questions(3), &options),
            DocumentType::Worksheet
        );
        assert_eq!(
            classify_document("Each answer is worth 5 points.", &questions(3), &options),
            DocumentType::Exam
        );
        assert_eq!(
            classify_document("Answer all.", &questions(2), &options),
            DocumentType::Unknown
        );
    }

    #[test]
    fn test_learning_objectives_block() {
        let text = "Course Overview\n\nLearning Objectives:\n1. Describe photosynthesis\n2. Explain respiration\n- Compare both processes\n\nWeek 1";
        assert_eq!(
            extract_learning_objectives(text),
            vec![
                "Describe photosynthesis",
                "Explain respiration",
                "Compare both processes"
            ]
        );
    }

    #[test]
    fn test_objective_on_marker_line() {
        let text = "Objectives: Identify parts of a Cell\n• Label the nucleus";
        assert_eq!(
            extract_learning_objectives(text),
            vec!["Identify parts of a Cell", "Label the nucleus"]
        );
    }

    #[test]
    fn test_chinese_objectives() {
        let text = "學習目標\n（1）認識細胞構造\n（2）了解細胞分裂";
        assert_eq!(
            extract_learning_objectives(text),
            vec!["認識細胞構造", "了解細胞分裂"]
        );
    }

    #[test]
    fn test_no_objectives() {
        assert!(extract_learning_objectives("Just some notes.").is_empty());
    }
}
