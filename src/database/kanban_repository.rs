//! Kanban persistence repository
//!
//! Each project has at most one current iteration. The board is
//! bootstrapped lazily: the first fetch creates the iteration and its
//! default columns inside a single transaction, so concurrent first
//! fetches cannot produce two current iterations.

use serde::Serialize;
use sqlx::SqlitePool;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct IterationRow {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_current: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ColumnRow {
    pub id: i64,
    pub iteration_id: i64,
    pub title: String,
    pub position: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CardRow {
    pub id: i64,
    pub column_id: i64,
    pub content: String,
    pub position: i64,
    pub creator_id: i64,
    pub created_at: String,
}

/// Column with its cards, as served to the board view
#[derive(Debug, Clone, Serialize)]
pub struct BoardColumn {
    #[serde(flatten)]
    pub column: ColumnRow,
    pub items: Vec<CardRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Board {
    pub iteration: IterationRow,
    pub board: Vec<BoardColumn>,
}

const DEFAULT_COLUMNS: [&str; 5] = ["Backlog", "Ready", "In progress", "In review", "Done"];

// ============================================================================
// Repository
// ============================================================================

pub struct KanbanRepository {
    pool: SqlitePool,
}

impl KanbanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch the current board for a project, creating the iteration and
    /// default columns on first access.
    pub async fn current_board(&self, project_id: i64) -> Result<Board, sqlx::Error> {
        let iteration = match self.current_iteration(project_id).await? {
            Some(iteration) => iteration,
            None => self.bootstrap_iteration(project_id).await?,
        };

        let columns = sqlx::query_as::<_, ColumnRow>(
            "SELECT * FROM kanban_columns WHERE iteration_id = ? ORDER BY position ASC",
        )
        .bind(iteration.id)
        .fetch_all(&self.pool)
        .await?;

        let mut board = Vec::with_capacity(columns.len());
        for column in columns {
            let items = sqlx::query_as::<_, CardRow>(
                "SELECT * FROM kanban_cards WHERE column_id = ? ORDER BY position ASC",
            )
            .bind(column.id)
            .fetch_all(&self.pool)
            .await?;
            board.push(BoardColumn { column, items });
        }

        Ok(Board { iteration, board })
    }

    async fn current_iteration(&self, project_id: i64) -> Result<Option<IterationRow>, sqlx::Error> {
        sqlx::query_as::<_, IterationRow>(
            "SELECT * FROM iterations WHERE project_id = ? AND is_current = 1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Insert the current iteration and default columns atomically. The
    /// insert is guarded so a racing bootstrap leaves exactly one current
    /// iteration; the loser re-reads the winner's row.
    async fn bootstrap_iteration(&self, project_id: i64) -> Result<IterationRow, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO iterations (project_id, name, is_current)
             SELECT ?, 'Current Iteration', 1
             WHERE NOT EXISTS (
                SELECT 1 FROM iterations WHERE project_id = ? AND is_current = 1
             )",
        )
        .bind(project_id)
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Someone else won the race
            tx.rollback().await?;
            return self
                .current_iteration(project_id)
                .await?
                .ok_or(sqlx::Error::RowNotFound);
        }

        let iteration_id = result.last_insert_rowid();
        for (position, title) in DEFAULT_COLUMNS.iter().enumerate() {
            sqlx::query("INSERT INTO kanban_columns (iteration_id, title, position) VALUES (?, ?, ?)")
                .bind(iteration_id)
                .bind(title)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        sqlx::query_as::<_, IterationRow>("SELECT * FROM iterations WHERE id = ?")
            .bind(iteration_id)
            .fetch_one(&self.pool)
            .await
    }

    /// Append a card at the end of its column
    pub async fn create_card(
        &self,
        column_id: i64,
        content: &str,
        creator_id: i64,
    ) -> Result<i64, sqlx::Error> {
        let max_pos: Option<i64> =
            sqlx::query_scalar("SELECT MAX(position) FROM kanban_cards WHERE column_id = ?")
                .bind(column_id)
                .fetch_one(&self.pool)
                .await?;
        let position = max_pos.unwrap_or(-1) + 1;

        let result = sqlx::query(
            "INSERT INTO kanban_cards (column_id, content, position, creator_id) VALUES (?, ?, ?, ?)",
        )
        .bind(column_id)
        .bind(content)
        .bind(position)
        .bind(creator_id)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{migrations, project_repository::NewProject, ProjectRepository, UserRepository};

    async fn seeded() -> (SqlitePool, i64, i64) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        migrations::run(&pool).await.unwrap();
        let users = UserRepository::new(pool.clone());
        let (user, _) = users
            .login_or_create("0x3333333333333333333333333333333333333333")
            .await
            .unwrap();
        let projects = ProjectRepository::new(pool.clone());
        let project = projects
            .create(&NewProject {
                name: "board".into(),
                description: None,
                owner_id: user.id,
                visibility: "Private".into(),
                status: "Unknown".into(),
                category: "Other".into(),
                start_date: crate::database::now_timestamp(),
            })
            .await
            .unwrap();
        (pool, user.id, project.id)
    }

    #[tokio::test]
    async fn first_fetch_bootstraps_default_board() {
        let (pool, _, project_id) = seeded().await;
        let repo = KanbanRepository::new(pool.clone());

        let board = repo.current_board(project_id).await.unwrap();
        assert!(board.iteration.is_current);
        assert_eq!(board.board.len(), 5);
        let titles: Vec<&str> = board.board.iter().map(|c| c.column.title.as_str()).collect();
        assert_eq!(titles, ["Backlog", "Ready", "In progress", "In review", "Done"]);
        for (i, col) in board.board.iter().enumerate() {
            assert_eq!(col.column.position, i as i64);
        }

        // Second fetch reuses the same iteration
        let again = repo.current_board(project_id).await.unwrap();
        assert_eq!(again.iteration.id, board.iteration.id);

        let current_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM iterations WHERE project_id = ? AND is_current = 1",
        )
        .bind(project_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(current_count, 1);
    }

    #[tokio::test]
    async fn cards_append_in_order() {
        let (pool, user_id, project_id) = seeded().await;
        let repo = KanbanRepository::new(pool);

        let board = repo.current_board(project_id).await.unwrap();
        let column_id = board.board[0].column.id;

        repo.create_card(column_id, "first", user_id).await.unwrap();
        repo.create_card(column_id, "second", user_id).await.unwrap();

        let board = repo.current_board(project_id).await.unwrap();
        let items = &board.board[0].items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].content, "first");
        assert_eq!(items[0].position, 0);
        assert_eq!(items[1].position, 1);
    }
}
