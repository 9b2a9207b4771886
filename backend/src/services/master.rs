//! Master-data lookups: the location hierarchy and employee classifications
//!
//! Read paths only; list queries over scoped tables are narrowed by the
//! caller's effective city scope before they reach the database.

use shared::models::{City, CityScope, Department, Designation, Ward, Zone};
use sqlx::PgPool;

use crate::error::AppResult;

/// Master-data lookup service
#[derive(Clone)]
pub struct MasterService {
    db: PgPool,
}

impl MasterService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Cities visible under the caller's scope
    pub async fn list_cities(&self, scope: &CityScope) -> AppResult<Vec<City>> {
        if !scope.all && scope.cities.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(i64, String)> = if scope.all {
            sqlx::query_as("SELECT id, name FROM cities ORDER BY name")
                .fetch_all(&self.db)
                .await?
        } else {
            sqlx::query_as("SELECT id, name FROM cities WHERE id = ANY($1) ORDER BY name")
                .bind(&scope.cities)
                .fetch_all(&self.db)
                .await?
        };

        Ok(rows
            .into_iter()
            .map(|(id, name)| City { id, name })
            .collect())
    }

    /// Zones, optionally within one city, narrowed by scope
    pub async fn list_zones(&self, city_id: Option<i64>, scope: &CityScope) -> AppResult<Vec<Zone>> {
        if !scope.all && scope.cities.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from("SELECT id, city_id, name FROM zones WHERE 1 = 1");
        if city_id.is_some() {
            sql.push_str(" AND city_id = $1");
        }
        if !scope.all {
            sql.push_str(if city_id.is_some() {
                " AND city_id = ANY($2)"
            } else {
                " AND city_id = ANY($1)"
            });
        }
        sql.push_str(" ORDER BY name");

        let mut query = sqlx::query_as::<_, (i64, i64, String)>(&sql);
        if let Some(city_id) = city_id {
            query = query.bind(city_id);
        }
        if !scope.all {
            query = query.bind(&scope.cities);
        }

        let rows = query.fetch_all(&self.db).await?;
        Ok(rows
            .into_iter()
            .map(|(id, city_id, name)| Zone { id, city_id, name })
            .collect())
    }

    /// Wards, optionally within one zone, narrowed by scope through the
    /// zone → city chain
    pub async fn list_wards(&self, zone_id: Option<i64>, scope: &CityScope) -> AppResult<Vec<Ward>> {
        if !scope.all && scope.cities.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT w.id, w.zone_id, w.name FROM wards w JOIN zones z ON z.id = w.zone_id WHERE 1 = 1",
        );
        if zone_id.is_some() {
            sql.push_str(" AND w.zone_id = $1");
        }
        if !scope.all {
            sql.push_str(if zone_id.is_some() {
                " AND z.city_id = ANY($2)"
            } else {
                " AND z.city_id = ANY($1)"
            });
        }
        sql.push_str(" ORDER BY w.name");

        let mut query = sqlx::query_as::<_, (i64, i64, String)>(&sql);
        if let Some(zone_id) = zone_id {
            query = query.bind(zone_id);
        }
        if !scope.all {
            query = query.bind(&scope.cities);
        }

        let rows = query.fetch_all(&self.db).await?;
        Ok(rows
            .into_iter()
            .map(|(id, zone_id, name)| Ward { id, zone_id, name })
            .collect())
    }

    pub async fn list_departments(&self) -> AppResult<Vec<Department>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM departments ORDER BY name")
                .fetch_all(&self.db)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| Department { id, name })
            .collect())
    }

    pub async fn list_designations(&self) -> AppResult<Vec<Designation>> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM designations ORDER BY name")
                .fetch_all(&self.db)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| Designation { id, name })
            .collect())
    }
}
