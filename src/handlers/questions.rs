use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::ListQuery;
use crate::models::{ChangeStatusRequest, Question, QuestionInput, Translation, TranslationInput};
use crate::services::token;
use crate::state::AppState;
use crate::validation;

fn translation_from_row(row: &SqliteRow) -> Translation {
    Translation {
        language_id: row.get("language_id"),
        question: row.get("question"),
        answer: row.get("answer"),
    }
}

async fn load_translations(
    pool: &SqlitePool,
    question_ref: &str,
) -> Result<Vec<Translation>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM question_translations WHERE question_ref = ? ORDER BY language_id",
    )
    .bind(question_ref)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(translation_from_row).collect())
}

async fn question_from_row(pool: &SqlitePool, row: &SqliteRow) -> Result<Question, sqlx::Error> {
    let id: String = row.get("id");
    let translations = load_translations(pool, &id).await?;
    Ok(Question {
        id,
        question_id: row.get("question_id"),
        active: row.get::<i64, _>("active") != 0,
        category_id: row.get("category_id"),
        translations,
        created_at: row.get("created_at"),
    })
}

async fn insert_translations(
    pool: &SqlitePool,
    question_ref: &str,
    translations: &[TranslationInput],
) -> Result<(), sqlx::Error> {
    for entry in translations {
        let language_id = entry
            .language_id
            .as_ref()
            .and_then(validation::coerce_language_id)
            .unwrap_or_default();
        sqlx::query(
            "INSERT INTO question_translations (id, question_ref, language_id, question, answer) VALUES (?, ?, ?, ?, ?)"
        )
        .bind(Uuid::new_v4().to_string())
        .bind(question_ref)
        .bind(language_id)
        .bind(entry.question.as_deref().unwrap_or("").trim())
        .bind(entry.answer.as_deref().unwrap_or("").trim())
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn list_questions(
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let pool = &state.pool;

    let rows = sqlx::query("SELECT * FROM questions ORDER BY created_at LIMIT ? OFFSET ?")
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(pool)
        .await;
    let rows = match rows {
        Ok(rows) => rows,
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    let mut questions = Vec::with_capacity(rows.len());
    for row in &rows {
        match question_from_row(pool, row).await {
            Ok(question) => questions.push(question),
            Err(e) => {
                return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
            }
        }
    }

    HttpResponse::Ok().json(json!({
        "questions": questions,
        "page": query.page(),
        "limit": query.limit()
    }))
}

pub async fn get_question(path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    let id = path.into_inner();
    let pool = &state.pool;

    let row = sqlx::query("SELECT * FROM questions WHERE id = ?")
        .bind(&id)
        .fetch_optional(pool)
        .await;
    match row {
        Ok(Some(row)) => match question_from_row(pool, &row).await {
            Ok(question) => HttpResponse::Ok().json(question),
            Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
        },
        Ok(None) => HttpResponse::NotFound().json(json!({ "error": "Question not found" })),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

pub async fn create_question(
    req: HttpRequest,
    data: web::Json<QuestionInput>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let input = data.into_inner();
    let pool = &state.pool;

    let translations = input.translations.unwrap_or_default();
    let errors = validation::validate_translations(&translations);
    if !errors.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "errors": errors }));
    }

    let id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    if let Err(e) = sqlx::query(
        "INSERT INTO questions (id, question_id, active, category_id, created_at) VALUES (?, ?, ?, ?, ?)"
    )
    .bind(&id)
    .bind(input.question_id)
    .bind(input.active.unwrap_or(true) as i64)
    .bind(input.category_id)
    .bind(&created_at)
    .execute(pool)
    .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }
    if let Err(e) = insert_translations(pool, &id, &translations).await {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    let row = sqlx::query("SELECT * FROM questions WHERE id = ?")
        .bind(&id)
        .fetch_one(pool)
        .await;
    match row {
        Ok(row) => match question_from_row(pool, &row).await {
            Ok(question) => HttpResponse::Created().json(question),
            Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
        },
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

pub async fn update_question(
    req: HttpRequest,
    path: web::Path<String>,
    data: web::Json<QuestionInput>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let id = path.into_inner();
    let input = data.into_inner();
    let pool = &state.pool;

    let row = sqlx::query("SELECT * FROM questions WHERE id = ?")
        .bind(&id)
        .fetch_optional(pool)
        .await;
    let mut question = match row {
        Ok(Some(row)) => match question_from_row(pool, &row).await {
            Ok(question) => question,
            Err(e) => {
                return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
            }
        },
        Ok(None) => return HttpResponse::NotFound().json(json!({ "error": "Question not found" })),
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    if let Some(translations) = &input.translations {
        let errors = validation::validate_translations(translations);
        if !errors.is_empty() {
            return HttpResponse::BadRequest().json(json!({ "errors": errors }));
        }
    }

    if let Some(question_id) = input.question_id {
        question.question_id = Some(question_id);
    }
    if let Some(active) = input.active {
        question.active = active;
    }
    if let Some(category_id) = input.category_id {
        question.category_id = Some(category_id);
    }

    if let Err(e) = sqlx::query(
        "UPDATE questions SET question_id = ?, active = ?, category_id = ? WHERE id = ?",
    )
    .bind(question.question_id)
    .bind(question.active as i64)
    .bind(question.category_id)
    .bind(&id)
    .execute(pool)
    .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    // a supplied translation set replaces the stored one wholesale
    if let Some(translations) = &input.translations {
        if let Err(e) = sqlx::query("DELETE FROM question_translations WHERE question_ref = ?")
            .bind(&id)
            .execute(pool)
            .await
        {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
        }
        if let Err(e) = insert_translations(pool, &id, translations).await {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
        }
        question.translations = match load_translations(pool, &id).await {
            Ok(translations) => translations,
            Err(e) => {
                return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
            }
        };
    }

    HttpResponse::Ok().json(question)
}

pub async fn delete_question(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let id = path.into_inner();
    let pool = &state.pool;

    // translations first, the questions row still holds the FK target
    if let Err(e) = sqlx::query("DELETE FROM question_translations WHERE question_ref = ?")
        .bind(&id)
        .execute(pool)
        .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }
    let result = sqlx::query("DELETE FROM questions WHERE id = ?")
        .bind(&id)
        .execute(pool)
        .await;
    match result {
        Ok(r) if r.rows_affected() == 0 => {
            HttpResponse::NotFound().json(json!({ "error": "Question not found" }))
        }
        Ok(_) => HttpResponse::Ok().json(json!({ "deleted": true })),
        Err(e) => HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    }
}

pub async fn change_status(
    req: HttpRequest,
    path: web::Path<String>,
    data: Option<web::Json<ChangeStatusRequest>>,
    state: web::Data<AppState>,
) -> HttpResponse {
    if let Err(resp) = token::authorize(&req, &state.config) {
        return resp;
    }
    let id = path.into_inner();
    let pool = &state.pool;

    let current = sqlx::query_scalar::<_, i64>("SELECT active FROM questions WHERE id = ?")
        .bind(&id)
        .fetch_optional(pool)
        .await;
    let current = match current {
        Ok(Some(active)) => active != 0,
        Ok(None) => return HttpResponse::NotFound().json(json!({ "error": "Question not found" })),
        Err(e) => {
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }))
        }
    };

    // explicit value if supplied, otherwise a toggle
    let next = data
        .and_then(|body| body.into_inner().active)
        .unwrap_or(!current);

    if let Err(e) = sqlx::query("UPDATE questions SET active = ? WHERE id = ?")
        .bind(next as i64)
        .bind(&id)
        .execute(pool)
        .await
    {
        return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
    }

    HttpResponse::Ok().json(json!({ "id": id, "active": next }))
}
