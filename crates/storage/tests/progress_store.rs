use std::sync::Arc;

use storage::{InMemoryProgressStore, ProgressStore, Storage};
use study_core::model::{
    Difficulty, Evaluation, MistakeType, ProgressBatch, Question, QuestionId, QuestionKind,
    SessionId, SkillTag, StudentId,
};
use study_core::time::fixed_now;

fn fractions_batch(correct: &[bool]) -> ProgressBatch {
    let questions: Vec<Question> = (1..=correct.len())
        .map(|id| Question {
            id: QuestionId::new(u32::try_from(id).unwrap()),
            prompt: format!("What is {id}/2 + {id}/2?"),
            kind: QuestionKind::ShortAnswer {
                canonical: id.to_string(),
                variants: Vec::new(),
            },
            skill: SkillTag::new("fractions").unwrap(),
            difficulty: Difficulty::Easy,
        })
        .collect();
    let evaluations: Vec<Evaluation> = questions
        .iter()
        .zip(correct)
        .map(|(q, ok)| Evaluation {
            question_id: q.id,
            correct: *ok,
            mistake: if *ok {
                MistakeType::Correct
            } else {
                MistakeType::ConceptualError
            },
            score: if *ok { 1.0 } else { 0.0 },
            rationale: "graded".into(),
        })
        .collect();
    ProgressBatch::from_evaluations(
        SessionId::new_v4(),
        "Fractions",
        &questions,
        &evaluations,
        fixed_now(),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_for_one_student_are_not_lost() {
    let store = Arc::new(InMemoryProgressStore::new());
    let student = StudentId::new("ada").unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        let student = student.clone();
        handles.push(tokio::spawn(async move {
            let batch = fractions_batch(&[true, i % 2 == 0]);
            store.update(&student, &batch).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let profile = store.get_profile(&student).await.unwrap();
    let record = profile.skill(&SkillTag::new("fractions").unwrap()).unwrap();
    assert_eq!(profile.total_sessions(), 16);
    assert_eq!(record.sessions(), 16);
    assert_eq!(record.attempts(), 32);
    assert_eq!(record.correct(), 24);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn students_are_independent() {
    let storage = Storage::in_memory();
    let ada = StudentId::new("ada").unwrap();
    let ben = StudentId::new("ben").unwrap();

    let ada_batch = fractions_batch(&[true, true, true]);
    let ben_batch = fractions_batch(&[false]);
    let (a, b) = tokio::join!(
        storage.progress.update(&ada, &ada_batch),
        storage.progress.update(&ben, &ben_batch),
    );
    a.unwrap();
    b.unwrap();

    let tag = SkillTag::new("fractions").unwrap();
    let ada_profile = storage.progress.get_profile(&ada).await.unwrap();
    let ben_profile = storage.progress.get_profile(&ben).await.unwrap();
    assert_eq!(ada_profile.skill(&tag).unwrap().attempts(), 3);
    assert_eq!(ben_profile.skill(&tag).unwrap().attempts(), 1);
    assert_eq!(ben_profile.skill(&tag).unwrap().correct(), 0);
}
