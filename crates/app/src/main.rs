use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use services::{
    AgentSet, AnswerSource, BackendConfig, ChatCompletionsBackend, Clock, JsonAgent,
    PipelineConfig, PipelineDriver, Session, SessionState,
};
use storage::Storage;
use study_core::model::{DifficultyPreference, Question, QuestionKind, StudentId, StudyRequest};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { flag: &'static str },
    UnknownArg(String),
    InvalidStudent { raw: String },
    InvalidMinutes { raw: String },
    InvalidDifficulty { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidStudent { raw } => write!(f, "invalid --student value: {raw:?}"),
            ArgsError::InvalidMinutes { raw } => write!(f, "invalid --minutes value: {raw}"),
            ArgsError::InvalidDifficulty { raw } => {
                write!(f, "invalid --difficulty value: {raw} (easy, medium, hard, mixed)")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  cargo run -p app -- --grade <grade> --subject <subject> --topic <topic> \
         [--student <id>] [--minutes <n>] [--difficulty <easy|medium|hard|mixed>]"
    );
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --student demo_student_1");
    eprintln!("  --minutes 20");
    eprintln!("  --difficulty mixed");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STUDY_AI_API_KEY (required), STUDY_AI_BASE_URL, STUDY_AI_MODEL");
    eprintln!("  STUDY_MAX_ATTEMPTS, STUDY_ANSWER_TIMEOUT_SECS, STUDY_LOG");
}

fn parse_request(args: &mut impl Iterator<Item = String>) -> Result<StudyRequest, ArgsError> {
    let mut student = String::from("demo_student_1");
    let mut grade = None;
    let mut subject = None;
    let mut topic = None;
    let mut time_minutes = 20;
    let mut difficulty = DifficultyPreference::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--student" => student = require_value(args, "--student")?,
            "--grade" => grade = Some(require_value(args, "--grade")?),
            "--subject" => subject = Some(require_value(args, "--subject")?),
            "--topic" => topic = Some(require_value(args, "--topic")?),
            "--minutes" => {
                let value = require_value(args, "--minutes")?;
                time_minutes = value
                    .parse::<u32>()
                    .ok()
                    .filter(|m| *m > 0)
                    .ok_or(ArgsError::InvalidMinutes { raw: value })?;
            }
            "--difficulty" => {
                let value = require_value(args, "--difficulty")?;
                difficulty = DifficultyPreference::parse(&value)
                    .ok_or(ArgsError::InvalidDifficulty { raw: value })?;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            _ => return Err(ArgsError::UnknownArg(arg)),
        }
    }

    let student = StudentId::new(student.clone()).map_err(|_| ArgsError::InvalidStudent { raw: student })?;
    Ok(StudyRequest {
        student,
        grade: grade.ok_or(ArgsError::MissingArg { flag: "--grade" })?,
        subject: subject.ok_or(ArgsError::MissingArg { flag: "--subject" })?,
        topic: topic.ok_or(ArgsError::MissingArg { flag: "--topic" })?,
        time_minutes,
        difficulty,
    })
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_env("STUDY_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| format!("failed to initialize tracing subscriber: {error}"))?;
    Ok(())
}

/// Reads answers line by line from stdin. End of input or `quit` cancels.
struct StdinAnswers {
    lines: Lines<BufReader<Stdin>>,
    last_index: Option<usize>,
}

impl StdinAnswers {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            last_index: None,
        }
    }
}

fn render_question(question: &Question, index: usize) -> String {
    let mut text = format!("\nQ{}. {}\n", index + 1, question.prompt);
    if let QuestionKind::MultipleChoice { options } = &question.kind {
        for (position, option) in options.iter().enumerate() {
            text.push_str(&format!("   {}) {}\n", position + 1, option.text));
        }
    }
    text.push_str("> ");
    text
}

#[async_trait]
impl AnswerSource for StdinAnswers {
    async fn next_answer(&mut self, question: &Question, index: usize) -> Option<String> {
        let prompt = if self.last_index == Some(index) {
            String::from("Please enter an answer (a number or the option text).\n> ")
        } else {
            render_question(question, index)
        };
        self.last_index = Some(index);

        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await.ok()?;
        stdout.flush().await.ok()?;

        let line = self.lines.next_line().await.ok()??;
        if line.trim().eq_ignore_ascii_case("quit") {
            return None;
        }
        Some(line)
    }
}

fn print_session(session: &Session) {
    let questions = session.questions();
    println!("\n=== Results ===");
    for ((question, evaluation), explanation) in questions
        .iter()
        .zip(session.evaluations())
        .zip(session.explanations())
    {
        let verdict = if evaluation.correct { "correct" } else { evaluation.mistake.as_str() };
        println!("Q{} [{}] {}", question.id, question.skill, verdict);
        if !evaluation.correct {
            println!("   hint: {}", explanation.hint);
            println!("   {}", explanation.explanation);
        }
    }

    for report in session.reports() {
        let narrative = &report.narrative;
        println!("\n--- Report for {} ---", narrative.audience);
        println!("{}", narrative.headline);
        println!("Strengths: {}", narrative.strengths);
        println!("Needs work: {}", narrative.weaknesses);
        println!("Next steps: {}", narrative.next_steps);
        for point in &narrative.bullet_points {
            println!(" - {point}");
        }
        if !narrative.recommended_topics.is_empty() {
            println!("Try next: {}", narrative.recommended_topics.join(", "));
        }
        if let Some(message) = &narrative.motivational_message {
            println!("{message}");
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let request = parse_request(&mut args).map_err(|e| {
        print_usage();
        e
    })?;

    init_tracing()?;

    let backend = ChatCompletionsBackend::new(BackendConfig::from_env()?);
    tracing::info!(model = backend.model(), "reasoning backend configured");
    let agents = AgentSet::uniform(Arc::new(JsonAgent::new(backend)));
    let driver = PipelineDriver::new(
        agents,
        Storage::in_memory(),
        Clock::system(),
        PipelineConfig::from_env()?,
    );

    let mut answers = StdinAnswers::new();
    let session = driver.run(request, &mut answers).await?;

    match session.state() {
        SessionState::Done => {
            print_session(&session);
            Ok(())
        }
        SessionState::Abandoned => {
            println!("\nSession ended before the worksheet was finished.");
            Ok(())
        }
        state => {
            let cause = session
                .failure()
                .map_or_else(|| state.to_string(), ToString::to_string);
            Err(cause.into())
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
