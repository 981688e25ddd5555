//! Request sequences behind each shop operation
//!
//! Random choices are drawn before any request is sent.

use crate::client::TargetClient;
use anyhow::Result;
use chrono::Datelike;
use loadtest_lib::Operation;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

pub const CURRENCIES: [&str; 6] = ["EUR", "USD", "JPY", "CAD", "GBP", "TRY"];

pub const PRODUCTS: [&str; 9] = [
    "0PUK6V6EV0",
    "1YMWWN1N4O",
    "2ZYFJ3GM2N",
    "66VCHSJNUP",
    "6E92ZMYYFZ",
    "9SIQT8TOJO",
    "L9ECAV7KIM",
    "LS4PSXUNUM",
    "OLJCESPC7Z",
];

const FIRST_NAMES: [&str; 8] = [
    "alice", "bruno", "chen", "dana", "emeka", "fatima", "goran", "hana",
];
const LAST_NAMES: [&str; 8] = [
    "smith", "garcia", "kowalski", "nguyen", "okafor", "rossi", "tanaka", "weber",
];
const MAIL_DOMAINS: [&str; 4] = ["example.com", "example.org", "example.net", "mail.test"];
const STREETS: [&str; 6] = [
    "Maple Avenue",
    "Oak Street",
    "Harbor Road",
    "Mill Lane",
    "Cedar Court",
    "Station Way",
];
const CITIES: [(&str, &str); 6] = [
    ("Springfield", "IL"),
    ("Portland", "OR"),
    ("Austin", "TX"),
    ("Madison", "WI"),
    ("Burlington", "VT"),
    ("Boulder", "CO"),
];
const COUNTRIES: [&str; 6] = [
    "United States",
    "Canada",
    "Germany",
    "Japan",
    "Turkey",
    "United Kingdom",
];

/// Execute the request sequence of `operation`
pub async fn execute<R: Rng + ?Sized>(
    operation: Operation,
    client: &TargetClient,
    rng: &mut R,
) -> Result<()> {
    match operation {
        Operation::Index => client.get("/").await,
        Operation::SetCurrency => {
            let currency = pick(rng, &CURRENCIES);
            client
                .post_form("/setCurrency", &[("currency_code", currency)])
                .await
        }
        Operation::BrowseProduct => {
            let product = pick(rng, &PRODUCTS);
            client.get(&format!("/product/{product}")).await
        }
        Operation::AddToCart => {
            let item = CartItem::random(rng);
            add_to_cart(client, &item).await
        }
        Operation::ViewCart => client.get("/cart").await,
        Operation::EmptyCart => client.post_form("/cart/empty", &[] as &[(&str, &str)]).await,
        Operation::Checkout => {
            let item = CartItem::random(rng);
            let customer = Customer::random(rng, chrono::Local::now().year());
            add_to_cart(client, &item).await?;
            client.post_form("/cart/checkout", &customer).await
        }
        Operation::Logout => client.get("/logout").await,
    }
}

async fn add_to_cart(client: &TargetClient, item: &CartItem) -> Result<()> {
    client.get(&format!("/product/{}", item.product_id)).await?;
    client.post_form("/cart", item).await
}

fn pick<R: Rng + ?Sized>(rng: &mut R, items: &[&'static str]) -> &'static str {
    items.choose(rng).copied().unwrap_or_default()
}

/// Form body of an add-to-cart request
#[derive(Debug, Clone, Serialize)]
pub struct CartItem {
    pub product_id: &'static str,
    pub quantity: u32,
}

impl CartItem {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            product_id: pick(rng, &PRODUCTS),
            quantity: rng.gen_range(1..=10),
        }
    }
}

/// Synthetic checkout form
#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub email: String,
    pub street_address: String,
    pub zip_code: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub credit_card_number: String,
    pub credit_card_expiration_month: u32,
    pub credit_card_expiration_year: i32,
    pub credit_card_cvv: String,
}

impl Customer {
    /// Random customer whose card expires between next year and 70 years after
    pub fn random<R: Rng + ?Sized>(rng: &mut R, current_year: i32) -> Self {
        let first = pick(rng, &FIRST_NAMES);
        let last = pick(rng, &LAST_NAMES);
        let (city, state) = CITIES.choose(rng).copied().unwrap_or(CITIES[0]);
        let next_year = current_year + 1;

        Self {
            email: format!(
                "{first}.{last}{}@{}",
                rng.gen_range(1..1000),
                pick(rng, &MAIL_DOMAINS)
            ),
            street_address: format!("{} {}", rng.gen_range(1..10_000), pick(rng, &STREETS)),
            zip_code: format!("{:05}", rng.gen_range(501..100_000)),
            city: city.to_string(),
            state: state.to_string(),
            country: pick(rng, &COUNTRIES).to_string(),
            credit_card_number: visa_number(rng),
            credit_card_expiration_month: rng.gen_range(1..=12),
            credit_card_expiration_year: rng.gen_range(next_year..=next_year + 70),
            credit_card_cvv: rng.gen_range(100..=999).to_string(),
        }
    }
}

/// 16-digit visa number with a valid Luhn check digit
pub fn visa_number<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut digits = vec![4u8];
    digits.extend((0..14).map(|_| rng.gen_range(0..10u8)));
    digits.push(luhn_check_digit(&digits));
    digits.iter().map(|d| char::from(b'0' + d)).collect()
}

/// Check digit that makes `payload` followed by it Luhn-valid
pub fn luhn_check_digit(payload: &[u8]) -> u8 {
    // Rightmost payload digit is doubled once the check digit is appended
    let sum: u32 = payload
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            let d = u32::from(d);
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

pub fn is_luhn_valid(number: &str) -> bool {
    let Some(digits) = number
        .chars()
        .map(|c| c.to_digit(10).map(|d| d as u8))
        .collect::<Option<Vec<u8>>>()
    else {
        return false;
    };

    match digits.split_last() {
        Some((&check, payload)) if !payload.is_empty() => luhn_check_digit(payload) == check,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    #[test]
    fn test_luhn_known_numbers() {
        assert!(is_luhn_valid("4111111111111111"));
        assert!(is_luhn_valid("4012888888881881"));
        assert!(!is_luhn_valid("4111111111111112"));
        assert!(!is_luhn_valid("41111111x1111111"));
        assert!(!is_luhn_valid("4"));
    }

    #[test]
    fn test_visa_numbers_are_luhn_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let number = visa_number(&mut rng);
            assert_eq!(number.len(), 16);
            assert!(number.starts_with('4'));
            assert!(is_luhn_valid(&number), "{number} fails the Luhn check");
        }
    }

    #[test]
    fn test_customer_field_ranges() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let customer = Customer::random(&mut rng, 2024);
            assert!((1..=12).contains(&customer.credit_card_expiration_month));
            assert!((2025..=2095).contains(&customer.credit_card_expiration_year));

            let cvv: u32 = customer.credit_card_cvv.parse().unwrap();
            assert!((100..=999).contains(&cvv));
            assert_eq!(customer.zip_code.len(), 5);
            assert!(customer.email.contains('@'));
        }
    }

    #[test]
    fn test_cart_item_ranges() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let item = CartItem::random(&mut rng);
            assert!(PRODUCTS.contains(&item.product_id));
            assert!((1..=10).contains(&item.quantity));
        }
    }

    fn client(server: &mockito::Server) -> TargetClient {
        TargetClient::new(&server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_set_currency_posts_known_code() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/setCurrency")
            .match_body(Matcher::Regex(
                "^currency_code=(EUR|USD|JPY|CAD|GBP|TRY)$".to_string(),
            ))
            .with_status(200)
            .create_async()
            .await;

        let mut rng = StdRng::seed_from_u64(1);
        execute(Operation::SetCurrency, &client(&server), &mut rng)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_add_to_cart_views_product_first() {
        let mut server = mockito::Server::new_async().await;
        let product = server
            .mock("GET", Matcher::Regex(r"^/product/[0-9A-Z]{10}$".to_string()))
            .with_status(200)
            .create_async()
            .await;
        let cart = server
            .mock("POST", "/cart")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("product_id=[0-9A-Z]{10}".to_string()),
                Matcher::Regex("quantity=([1-9]|10)$".to_string()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let mut rng = StdRng::seed_from_u64(2);
        execute(Operation::AddToCart, &client(&server), &mut rng)
            .await
            .unwrap();

        product.assert_async().await;
        cart.assert_async().await;
    }

    #[tokio::test]
    async fn test_checkout_submits_customer() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex("^/product/".to_string()))
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/cart")
            .with_status(200)
            .create_async()
            .await;
        let checkout = server
            .mock("POST", "/cart/checkout")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("email=".to_string()),
                Matcher::Regex("credit_card_number=4[0-9]{15}".to_string()),
                Matcher::Regex("credit_card_cvv=[0-9]{3}".to_string()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let mut rng = StdRng::seed_from_u64(9);
        execute(Operation::Checkout, &client(&server), &mut rng)
            .await
            .unwrap();

        checkout.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_fails_operation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/cart")
            .with_status(500)
            .with_body("cart service unavailable")
            .create_async()
            .await;

        let mut rng = StdRng::seed_from_u64(4);
        let err = execute(Operation::ViewCart, &client(&server), &mut rng)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("500"));
    }
}
