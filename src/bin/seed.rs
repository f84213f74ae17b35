use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use storefront_checkout::{
    config::AppConfig,
    db::create_pool,
    middleware::auth::Claims,
    services::inventory::sync_product_stock,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "admin@example.com", "admin").await?;
    let customer_id = ensure_user(&pool, "customer@example.com", "user").await?;
    let product_ids = seed_catalog(&pool).await?;
    sync_product_stock(&pool, &product_ids).await?;
    seed_discount(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, Customer ID: {customer_id}");

    match std::env::var("JWT_SECRET") {
        Ok(secret) => {
            println!("Admin token: {}", mint_token(&secret, admin_id, "admin")?);
            println!("Customer token: {}", mint_token(&secret, customer_id, "user")?);
        }
        Err(_) => println!("JWT_SECRET not set; skipping dev tokens"),
    }
    Ok(())
}

async fn ensure_user(pool: &sqlx::PgPool, email: &str, role: &str) -> anyhow::Result<Uuid> {
    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, role)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<Vec<Uuid>> {
    let catalog: Vec<(&str, &str, Decimal, Option<Decimal>, Vec<(&str, &str, i32)>)> = vec![
        (
            "Ferris Tee",
            "Cotton tee with Ferris on the front",
            dec!(20.00),
            None,
            vec![("red", "M", 5), ("red", "L", 3), ("black", "M", 8)],
        ),
        (
            "Async Hoodie",
            "Warm hoodie for long compile times",
            dec!(55.00),
            Some(dec!(20)),
            vec![("grey", "S", 4), ("grey", "M", 0), ("grey", "XL", 2)],
        ),
        (
            "Borrow Checker Cap",
            "Fits everyone",
            dec!(15.55),
            None,
            vec![("navy", "ONESIZE", 25)],
        ),
    ];

    let mut product_ids = Vec::with_capacity(catalog.len());
    for (name, description, price, promo, variants) in catalog {
        let (product_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO products (id, name, description, price, promo_active, promo_percent)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(promo.is_some())
        .bind(promo.unwrap_or(Decimal::ZERO))
        .fetch_one(pool)
        .await?;

        for (color, size, stock) in variants {
            sqlx::query(
                r#"
                INSERT INTO product_variants (id, product_id, color, size, stock)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT ON CONSTRAINT uq_product_variants_tuple DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(color)
            .bind(size)
            .bind(stock)
            .execute(pool)
            .await?;
        }
        product_ids.push(product_id);
    }

    println!("Seeded {} products", product_ids.len());
    Ok(product_ids)
}

async fn seed_discount(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO discount_codes (id, code, kind, value, min_order_amount)
        VALUES ($1, 'SAVE10', 'percent', 10, 30)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .execute(pool)
    .await?;

    println!("Seeded discount SAVE10");
    Ok(())
}

fn mint_token(secret: &str, user_id: Uuid, role: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::days(7)).timestamp() as usize,
        sid: Some(Uuid::new_v4().to_string()),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}
