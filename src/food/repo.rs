use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use sqlx::types::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{
    CatalogPage, CatalogQuery, Food, FoodGroup, FoodHistory, FoodInput, FoodRow, FoodStatus,
    NutritionTotals,
};
use crate::db::PgRepo;

#[async_trait]
pub trait FoodStore: Send + Sync {
    /// Inserts a food together with the caller's history row for it.
    async fn create_with_history(
        &self,
        user_id: Uuid,
        input: &FoodInput,
        status: FoodStatus,
    ) -> anyhow::Result<(Food, FoodHistory)>;

    /// Stores the image URL on a draft and marks it complete. A food that is
    /// already complete with the same URL is returned unchanged.
    async fn link_image(&self, food_id: Uuid, image_url: &str) -> anyhow::Result<Food>;

    /// Bumps `updated_at` of a draft so the reclaimer leaves it alone while a
    /// resume is in flight. False when the food is not a draft.
    async fn touch_draft(&self, food_id: Uuid) -> anyhow::Result<bool>;

    async fn find_food(&self, food_id: Uuid) -> anyhow::Result<Option<Food>>;

    /// Complete foods matching the query, ordered by name.
    async fn list_foods(&self, query: &CatalogQuery) -> anyhow::Result<CatalogPage>;

    /// Drafts not touched since `updated_before`.
    async fn stale_drafts(&self, updated_before: OffsetDateTime) -> anyhow::Result<Vec<Uuid>>;

    /// Deletes a food only if it is still a draft. History rows cascade.
    async fn delete_draft(&self, food_id: Uuid) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_entry(&self, user_id: Uuid, food_id: Uuid) -> anyhow::Result<FoodHistory>;

    async fn set_rating(&self, history_id: Uuid, rating: i16) -> anyhow::Result<()>;

    /// Most recent history row of `user_id` for `food_id`.
    async fn latest_entry(&self, user_id: Uuid, food_id: Uuid)
        -> anyhow::Result<Option<FoodHistory>>;

    /// Raw nutrition sums over `[start, end)`; no rows sum to zero.
    async fn totals_between(
        &self,
        user_id: Uuid,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> anyhow::Result<NutritionTotals>;

    /// History rows joined to their food, most recent first.
    async fn entries_with_food(&self, user_id: Uuid) -> anyhow::Result<Vec<(FoodHistory, Food)>>;
}

/// Append-only ledger of successful scans.
#[async_trait]
pub trait ScanLedger: Send + Sync {
    async fn count_between(
        &self,
        user_id: Uuid,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> anyhow::Result<i64>;

    async fn record_scan(&self, user_id: Uuid, at: OffsetDateTime) -> anyhow::Result<()>;
}

#[async_trait]
pub trait FoodGroupStore: Send + Sync {
    async fn all_groups(&self) -> anyhow::Result<Vec<FoodGroup>>;
}

const FOOD_COLUMNS: &str = "id, name, calories, protein, sugar, fat, carbohydrate, grade, \
                            image_url, tags, food_type, status, created_at, updated_at";

/// Result of a link that matched no draft. Only a food a concurrent resume
/// already completed with the same image counts as linked.
pub(crate) fn already_linked(
    food_id: Uuid,
    image_url: &str,
    current: Option<Food>,
) -> anyhow::Result<Food> {
    match current {
        Some(food)
            if food.status == FoodStatus::Complete
                && food.image_url.as_deref() == Some(image_url) =>
        {
            Ok(food)
        }
        Some(food) => anyhow::bail!(
            "food {} is {} with another image, not linking",
            food_id,
            food.status.as_str()
        ),
        None => anyhow::bail!("food {} vanished before link", food_id),
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[async_trait]
impl FoodStore for PgRepo {
    async fn create_with_history(
        &self,
        user_id: Uuid,
        input: &FoodInput,
        status: FoodStatus,
    ) -> anyhow::Result<(Food, FoodHistory)> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let food = sqlx::query_as::<_, FoodRow>(&format!(
            r#"
            INSERT INTO foods (id, name, calories, protein, sugar, fat, carbohydrate,
                               grade, tags, food_type, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {FOOD_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.name.trim())
        .bind(input.calories)
        .bind(input.protein)
        .bind(input.sugar)
        .bind(input.fat)
        .bind(input.carbohydrate)
        .bind(input.grade.as_deref())
        .bind(&input.tags)
        .bind(input.food_type.as_deref())
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await
        .context("insert food")?;

        let history = sqlx::query_as::<_, FoodHistory>(
            r#"
            INSERT INTO food_history (id, user_id, food_id)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, food_id, rating, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(food.id)
        .fetch_one(&mut *tx)
        .await
        .context("insert food history")?;

        tx.commit().await.context("commit tx")?;
        Ok((food.into(), history))
    }

    async fn link_image(&self, food_id: Uuid, image_url: &str) -> anyhow::Result<Food> {
        let row = sqlx::query_as::<_, FoodRow>(&format!(
            r#"
            UPDATE foods
               SET image_url = $2, status = 'complete', updated_at = now()
             WHERE id = $1 AND status = 'draft'
            RETURNING {FOOD_COLUMNS}
            "#
        ))
        .bind(food_id)
        .bind(image_url)
        .fetch_optional(&self.db)
        .await
        .context("update food image")?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                let current = self.find_food(food_id).await?;
                already_linked(food_id, image_url, current)
            }
        }
    }

    async fn touch_draft(&self, food_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "UPDATE foods SET updated_at = now() WHERE id = $1 AND status = 'draft'",
        )
        .bind(food_id)
        .execute(&self.db)
        .await
        .context("touch draft")?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_food(&self, food_id: Uuid) -> anyhow::Result<Option<Food>> {
        let row = sqlx::query_as::<_, FoodRow>(&format!(
            "SELECT {FOOD_COLUMNS} FROM foods WHERE id = $1"
        ))
        .bind(food_id)
        .fetch_optional(&self.db)
        .await
        .context("find food")?;
        Ok(row.map(Food::from))
    }

    async fn list_foods(&self, query: &CatalogQuery) -> anyhow::Result<CatalogPage> {
        let name = query.name.as_deref().map(escape_like);
        let filter = r#"
            status = 'complete'
            AND ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
            AND (cardinality($2::int4[]) = 0 OR tags @> $2)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM foods WHERE {filter}"))
            .bind(name.as_deref())
            .bind(&query.tags)
            .fetch_one(&self.db)
            .await
            .context("count foods")?;

        let rows = sqlx::query_as::<_, FoodRow>(&format!(
            r#"
            SELECT {FOOD_COLUMNS} FROM foods
             WHERE {filter}
             ORDER BY name ASC, id ASC
             LIMIT $3 OFFSET $4
            "#
        ))
        .bind(name.as_deref())
        .bind(&query.tags)
        .bind(i64::from(query.limit))
        .bind(query.offset())
        .fetch_all(&self.db)
        .await
        .context("list foods")?;

        Ok(CatalogPage {
            data: rows.into_iter().map(Food::from).collect(),
            total,
        })
    }

    async fn stale_drafts(&self, updated_before: OffsetDateTime) -> anyhow::Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM foods WHERE status = 'draft' AND updated_at < $1",
        )
        .bind(updated_before)
        .fetch_all(&self.db)
        .await
        .context("list stale drafts")?;
        Ok(ids)
    }

    async fn delete_draft(&self, food_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM foods WHERE id = $1 AND status = 'draft'")
            .bind(food_id)
            .execute(&self.db)
            .await
            .context("delete draft")?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl HistoryStore for PgRepo {
    async fn append_entry(&self, user_id: Uuid, food_id: Uuid) -> anyhow::Result<FoodHistory> {
        let row = sqlx::query_as::<_, FoodHistory>(
            r#"
            INSERT INTO food_history (id, user_id, food_id)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, food_id, rating, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(food_id)
        .fetch_one(&self.db)
        .await
        .context("insert food history")?;
        Ok(row)
    }

    async fn set_rating(&self, history_id: Uuid, rating: i16) -> anyhow::Result<()> {
        let res = sqlx::query("UPDATE food_history SET rating = $2 WHERE id = $1")
            .bind(history_id)
            .bind(rating)
            .execute(&self.db)
            .await
            .context("update rating")?;
        anyhow::ensure!(res.rows_affected() == 1, "history row {} not found", history_id);
        Ok(())
    }

    async fn latest_entry(
        &self,
        user_id: Uuid,
        food_id: Uuid,
    ) -> anyhow::Result<Option<FoodHistory>> {
        let row = sqlx::query_as::<_, FoodHistory>(
            r#"
            SELECT id, user_id, food_id, rating, created_at
              FROM food_history
             WHERE user_id = $1 AND food_id = $2
             ORDER BY created_at DESC
             LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(food_id)
        .fetch_optional(&self.db)
        .await
        .context("latest history entry")?;
        Ok(row)
    }

    async fn totals_between(
        &self,
        user_id: Uuid,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> anyhow::Result<NutritionTotals> {
        // Summed as numeric so the total is the exact decimal of the rows.
        let (calories, protein, sugar) = sqlx::query_as::<_, (Decimal, Decimal, Decimal)>(
            r#"
            SELECT COALESCE(SUM(f.calories::numeric), 0),
                   COALESCE(SUM(f.protein::numeric), 0),
                   COALESCE(SUM(f.sugar::numeric), 0)
              FROM food_history h
              JOIN foods f ON f.id = h.food_id
             WHERE h.user_id = $1
               AND h.created_at >= $2
               AND h.created_at < $3
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.db)
        .await
        .context("sum daily nutrition")?;

        let to_f64 = |d: Decimal| {
            d.to_f64()
                .with_context(|| format!("nutrition sum {} out of range", d))
        };
        Ok(NutritionTotals {
            calories: to_f64(calories)?,
            protein: to_f64(protein)?,
            sugar: to_f64(sugar)?,
        })
    }

    async fn entries_with_food(&self, user_id: Uuid) -> anyhow::Result<Vec<(FoodHistory, Food)>> {
        let entries = sqlx::query_as::<_, FoodHistory>(
            r#"
            SELECT id, user_id, food_id, rating, created_at
              FROM food_history
             WHERE user_id = $1
             ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list food history")?;

        let food_ids: Vec<Uuid> = entries.iter().map(|e| e.food_id).collect();
        let foods: HashMap<Uuid, Food> = sqlx::query_as::<_, FoodRow>(&format!(
            "SELECT {FOOD_COLUMNS} FROM foods WHERE id = ANY($1)"
        ))
        .bind(&food_ids)
        .fetch_all(&self.db)
        .await
        .context("load history foods")?
        .into_iter()
        .map(|r| (r.id, Food::from(r)))
        .collect();

        Ok(entries
            .into_iter()
            .filter_map(|e| foods.get(&e.food_id).cloned().map(|f| (e, f)))
            .collect())
    }
}

#[async_trait]
impl ScanLedger for PgRepo {
    async fn count_between(
        &self,
        user_id: Uuid,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
              FROM scan_history
             WHERE user_id = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.db)
        .await
        .context("count scans")?;
        Ok(count)
    }

    async fn record_scan(&self, user_id: Uuid, at: OffsetDateTime) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO scan_history (id, user_id, created_at) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(at)
            .execute(&self.db)
            .await
            .context("insert scan history")?;
        Ok(())
    }
}

#[async_trait]
impl FoodGroupStore for PgRepo {
    async fn all_groups(&self) -> anyhow::Result<Vec<FoodGroup>> {
        let rows = sqlx::query_as::<_, FoodGroup>("SELECT id, name FROM food_groups")
            .fetch_all(&self.db)
            .await
            .context("load food groups")?;
        Ok(rows)
    }
}
