use clap::Args;
use tailor_core::domain::feedback::{FeedbackSource, FitFeedbackInput, FitIssue, FitRating};
use tailor_core::domain::sizing::SizeCode;
use tailor_core::domain::student::StudentId;

use crate::commands::{run_with_service, CommandFailure, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct FeedbackArgs {
    #[arg(long)]
    pub student_id: i64,
    #[arg(long)]
    pub garment_type: String,
    #[arg(
        long,
        value_parser = parse_rating,
        help = "too_small, slightly_small, perfect, slightly_large or too_large"
    )]
    pub rating: FitRating,
    #[arg(long, help = "1 (unhappy) to 5 (very happy)")]
    pub satisfaction: u8,
    #[arg(
        long = "issue",
        value_parser = parse_issue,
        help = "Problem area as AREA=NOTE, e.g. sleeves=slightly long; repeatable"
    )]
    pub issues: Vec<FitIssue>,
    #[arg(
        long,
        value_parser = parse_size_code,
        help = "Delivered size; defaults to the recommended one"
    )]
    pub size_code: Option<SizeCode>,
    #[arg(long)]
    pub comment: Option<String>,
    #[arg(long, value_parser = parse_source, default_value = "post_delivery")]
    pub source: FeedbackSource,
    #[arg(long, help = "Who answered, e.g. parent or student")]
    pub responded_by: Option<String>,
}

impl FeedbackArgs {
    fn into_input(self) -> FitFeedbackInput {
        FitFeedbackInput {
            student_id: StudentId(self.student_id),
            garment_type: self.garment_type,
            size_code: self.size_code,
            fit_rating: self.rating,
            specific_issues: self.issues,
            satisfaction_score: self.satisfaction,
            comment: self.comment,
            source: self.source,
            responded_by: self.responded_by,
        }
    }
}

pub fn record(args: FeedbackArgs) -> CommandResult {
    let input = args.into_input();
    run_with_service("feedback", move |service| async move {
        service.record_fit_feedback(input).await.map_err(CommandFailure::from)
    })
}

pub fn list(student_id: i64) -> CommandResult {
    run_with_service("feedback-history", move |service| async move {
        service.fit_feedback(StudentId(student_id)).await.map_err(CommandFailure::from)
    })
}

fn parse_rating(value: &str) -> Result<FitRating, String> {
    FitRating::parse(value).ok_or_else(|| format!("unknown fit rating `{value}`"))
}

fn parse_source(value: &str) -> Result<FeedbackSource, String> {
    FeedbackSource::parse(value)
        .ok_or_else(|| format!("expected post_delivery, fitting or exchange, got `{value}`"))
}

fn parse_size_code(value: &str) -> Result<SizeCode, String> {
    SizeCode::parse(value).ok_or_else(|| format!("unknown size code `{value}`"))
}

fn parse_issue(value: &str) -> Result<FitIssue, String> {
    let (area, note) =
        value.split_once('=').ok_or_else(|| format!("expected AREA=NOTE, got `{value}`"))?;
    Ok(FitIssue { area: area.trim().to_string(), note: note.trim().to_string() })
}

#[cfg(test)]
mod tests {
    use super::{parse_issue, parse_rating};
    use tailor_core::domain::feedback::{FitIssue, FitRating};

    #[test]
    fn issues_split_on_the_first_equals_sign() {
        assert_eq!(
            parse_issue("sleeves = slightly long"),
            Ok(FitIssue { area: "sleeves".to_string(), note: "slightly long".to_string() })
        );
        assert_eq!(parse_issue("collar=a=b").map(|issue| issue.note), Ok("a=b".to_string()));
        assert!(parse_issue("sleeves").is_err());
    }

    #[test]
    fn ratings_parse_operator_spellings() {
        assert_eq!(parse_rating("too-small"), Ok(FitRating::TooSmall));
        assert!(parse_rating("fine").is_err());
    }
}
