use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, bail};
use clap::Parser;
use course_composer::{
    certificate::{Certificate, course_quiz_score},
    composer::CourseComposer,
    config::Config,
    course::{Course, CourseForm, CourseOutline},
    error::Error,
    progress::{CourseProgress, Dashboard, ProgressService},
    quiz::QuizResultService,
    session::{Role, SessionStore},
    store::{MemoryStore, RecordStore, RestStore},
    utils::init_log,
};

#[derive(Debug, clap::Parser)]
#[command(author, version, about = "Course composition manager", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Base URL of the record store, overrides the config
    #[arg(short, long)]
    store_url: Option<String>,
    /// Directory holding the session, overrides the config
    #[arg(long)]
    session_dir: Option<PathBuf>,
    /// Use an in-process store, nothing outlives the command
    #[arg(long)]
    memory: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    Login {
        #[command(subcommand)]
        role: LoginCommand,
    },
    Logout,
    Whoami,
    Course {
        #[command(subcommand)]
        command: CourseCommand,
    },
    Progress {
        #[command(subcommand)]
        command: ProgressCommand,
    },
    Quiz {
        #[command(subcommand)]
        command: QuizCommand,
    },
    /// Issue the certificate of a completed course
    Certificate { course_id: i64 },
}

#[derive(Debug, clap::Subcommand)]
enum LoginCommand {
    Student,
    Instructor,
}

#[derive(Debug, clap::Subcommand)]
enum CourseCommand {
    List,
    Show { id: i64 },
    /// Create a course from a JSON authoring form
    Create { form: PathBuf },
    /// Rebuild a course from a JSON authoring form
    Update { id: i64, form: PathBuf },
    /// Print the authoring form of a course
    Export { id: i64 },
    Delete { id: i64 },
}

#[derive(Debug, clap::Subcommand)]
enum ProgressCommand {
    Show { course_id: i64 },
    Toggle { course_id: i64, lesson_id: i64 },
    Summary,
}

#[derive(Debug, clap::Subcommand)]
enum QuizCommand {
    Show { chapter_id: i64 },
    /// Answer a chapter quiz, one choice index per question
    Take { chapter_id: i64, answers: Vec<usize> },
    Result { chapter_id: i64 },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    let _guard = match init_log(config.log_dir.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {:?}", e);
            std::process::exit(2);
        }
    };
    if let Err(e) = run(args, config).await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args, mut config: Config) -> anyhow::Result<()> {
    if let Some(url) = args.store_url {
        config.store_url = url;
    }
    if let Some(dir) = args.session_dir {
        config.session_dir = dir;
    }
    let session = SessionStore::hydrate(&config.session_dir)?;
    let store = open_store(&config, args.memory)?;
    let composer = CourseComposer::new(store.clone(), config.max_concurrent_requests);

    match args.command {
        Commands::Login { role } => {
            let user = match role {
                LoginCommand::Student => session.login_as_student()?,
                LoginCommand::Instructor => session.login_as_instructor()?,
            };
            println!("Logged in as {} ({})", user.name, user.role);
        }
        Commands::Logout => {
            session.logout()?;
            println!("Logged out");
        }
        Commands::Whoami => match session.current_user() {
            Some(user) => println!("{:<6} {} ({})", user.id, user.name, user.role),
            None => println!("Not logged in"),
        },
        Commands::Course { command } => course_command(command, &session, &composer).await?,
        Commands::Progress { command } => {
            let user = session.require_user()?;
            let progress = ProgressService::new(store.clone());
            match command {
                ProgressCommand::Show { course_id } => {
                    let (_, outline) = load_outline(&composer, course_id).await?;
                    let record = progress.progress_for_course(user.id, course_id).await?;
                    println!("{}", outline.title);
                    for chapter in &outline.chapters {
                        println!("  {}", chapter.title);
                        for lesson in &chapter.lessons {
                            let mark = if progress.is_lesson_completed(lesson.id) {
                                "x"
                            } else {
                                " "
                            };
                            println!("    [{}] {:<8} {}", mark, lesson.id, lesson.title);
                        }
                    }
                    let summary = CourseProgress::of(&outline, record.as_ref());
                    println!(
                        "{}/{} lessons, {:.0}%",
                        summary.completed, summary.total, summary.percentage
                    );
                }
                ProgressCommand::Toggle {
                    course_id,
                    lesson_id,
                } => {
                    let (_, outline) = load_outline(&composer, course_id).await?;
                    if !outline.lesson_ids().contains(&lesson_id) {
                        bail!("lesson {} is not part of course {}", lesson_id, course_id);
                    }
                    progress.toggle_lesson(user.id, course_id, lesson_id).await?;
                    let state = if progress.is_lesson_completed(lesson_id) {
                        "completed"
                    } else {
                        "not completed"
                    };
                    println!("Lesson {} marked {}", lesson_id, state);
                }
                ProgressCommand::Summary => {
                    let courses = composer.fetch_courses().await?;
                    let lessons = composer.lessons().fetch_lessons().await?;
                    let records = progress.fetch_all_for_user(user.id).await?;
                    let dashboard = Dashboard::build(user.id, &courses, &lessons, &records);
                    for course in &dashboard.courses {
                        println!(
                            "{:<8} {:<40} {}/{} {:.0}%",
                            course.course_id,
                            course.title,
                            course.progress.completed,
                            course.progress.total,
                            course.progress.percentage
                        );
                    }
                    println!(
                        "Overall: {}/{} lessons, {:.0}%",
                        dashboard.completed_lessons,
                        dashboard.total_lessons,
                        dashboard.overall_percentage
                    );
                }
            }
        }
        Commands::Quiz { command } => {
            let user = session.require_user()?;
            let results = QuizResultService::new(store.clone());
            composer.quizzes().fetch_quizzes().await?;
            match command {
                QuizCommand::Show { chapter_id } => {
                    let quiz = composer
                        .quizzes()
                        .quiz_by_chapter(chapter_id)
                        .with_context(|| format!("chapter {} has no quiz", chapter_id))?;
                    for (i, question) in quiz.questions.iter().enumerate() {
                        println!("{}. {}", i + 1, question.question);
                        for (j, choice) in question.choices.iter().enumerate() {
                            println!("   {}) {}", j, choice);
                        }
                    }
                }
                QuizCommand::Take {
                    chapter_id,
                    answers,
                } => {
                    let quiz = composer
                        .quizzes()
                        .quiz_by_chapter(chapter_id)
                        .with_context(|| format!("chapter {} has no quiz", chapter_id))?;
                    let result = quiz.grade(user.id, &answers);
                    if results.save_result(&result).await? {
                        println!(
                            "Score: {}/{} ({}%)",
                            result.score,
                            result.total,
                            result.percentage()
                        );
                    } else {
                        let first = results.get_result(user.id, chapter_id).unwrap_or(result);
                        println!(
                            "Quiz already taken, first score kept: {}/{} ({}%)",
                            first.score,
                            first.total,
                            first.percentage()
                        );
                    }
                }
                QuizCommand::Result { chapter_id } => {
                    results.fetch_results().await?;
                    match results.get_result(user.id, chapter_id) {
                        Some(r) => println!("{}/{} ({}%)", r.score, r.total, r.percentage()),
                        None => println!("Quiz not taken yet"),
                    }
                }
            }
        }
        Commands::Certificate { course_id } => {
            let user = session.require_user()?;
            let (course, outline) = load_outline(&composer, course_id).await?;
            let progress = ProgressService::new(store.clone());
            let record = progress.progress_for_course(user.id, course_id).await?;
            let completed = CourseProgress::of(&outline, record.as_ref()).completed;

            let quizzes = composer.quizzes().fetch_quizzes().await?;
            let results = QuizResultService::new(store.clone())
                .fetch_results()
                .await?;
            let score = course_quiz_score(&course, &quizzes, &results, user.id);

            match Certificate::issue(&outline, user.id, &user.name, completed, score) {
                Some(certificate) => {
                    println!("Certificate {}", certificate.certificate_id());
                    println!("  {}", certificate.student_name);
                    println!("  completed {}", certificate.course_name);
                    println!("  on {}", certificate.completion_date);
                    if let Some(score) = certificate.score {
                        println!("  quiz score {}%", score);
                    }
                    println!("  file {}", certificate.file_name());
                }
                None => {
                    println!(
                        "Not eligible: {}/{} lessons completed, quiz score {}",
                        completed,
                        outline.lesson_ids().len(),
                        score.map_or("n/a".to_string(), |s| format!("{}%", s))
                    );
                }
            }
        }
    }
    Ok(())
}

async fn course_command(
    command: CourseCommand,
    session: &SessionStore,
    composer: &CourseComposer,
) -> anyhow::Result<()> {
    match command {
        CourseCommand::List => {
            for course in composer.fetch_courses().await? {
                println!(
                    "{:<8} {:<40} {:<16} {} lessons",
                    course.id,
                    course.title,
                    course.category,
                    course.lesson_count()
                );
            }
        }
        CourseCommand::Show { id } => {
            let (course, outline) = load_outline(composer, id).await?;
            println!("{} [{}]", course.title, course.category);
            if !course.description.is_empty() {
                println!("{}", course.description);
            }
            for chapter in &outline.chapters {
                let quiz = composer
                    .quizzes()
                    .quiz_by_chapter(chapter.id)
                    .map(|q| format!(", quiz of {} questions", q.questions.len()))
                    .unwrap_or_default();
                println!("  {:<8} {}{}", chapter.id, chapter.title, quiz);
                for lesson in &chapter.lessons {
                    println!("    {:<8} {:<40} {}", lesson.id, lesson.title, lesson.video_url);
                }
            }
            println!("{} lessons", outline.total_lessons());
        }
        CourseCommand::Create { form } => {
            let user = session.require_role(Role::Instructor)?;
            let mut form = read_form(&form)?;
            form.instructor_id = user.id;
            let course = composer.save(None, &form).await?;
            println!("Course created with id: {}", course.id);
        }
        CourseCommand::Update { id, form } => {
            let user = session.require_role(Role::Instructor)?;
            let mut form = read_form(&form)?;
            form.instructor_id = user.id;
            let course = composer.save(Some(id), &form).await?;
            println!("Course updated with id: {}", course.id);
        }
        CourseCommand::Export { id } => {
            session.require_role(Role::Instructor)?;
            let form = composer.edit_form(id).await?;
            println!("{}", serde_json::to_string_pretty(&form)?);
        }
        CourseCommand::Delete { id } => {
            session.require_role(Role::Instructor)?;
            composer.delete_course(id).await?;
            println!("Course deleted with id: {}", id);
        }
    }
    Ok(())
}

fn open_store(config: &Config, memory: bool) -> anyhow::Result<Arc<dyn RecordStore>> {
    if memory {
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(RestStore::from_config(config)?))
}

fn read_form(path: &Path) -> anyhow::Result<CourseForm> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid course form {}", path.display()))
}

async fn load_outline(
    composer: &CourseComposer,
    course_id: i64,
) -> anyhow::Result<(Course, CourseOutline)> {
    composer.fetch_courses().await?;
    let course = composer
        .course(course_id)
        .ok_or(Error::CourseNotFound(course_id))?;
    let lessons = composer.lessons().fetch_lessons().await?;
    composer.quizzes().fetch_quizzes().await?;
    let outline = CourseOutline::resolve(&course, &lessons);
    Ok((course, outline))
}
