#![allow(dead_code)]

use docmap::{memory::InMemoryProvider, prelude::*};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Color {
    pub hue: String,
    pub alpha: i32,
}

impl Color {
    pub fn new(hue: &str, alpha: i32) -> Self {
        Self {
            hue: hue.to_string(),
            alpha,
        }
    }

    fn fields() -> Vec<String> {
        vec!["hue".to_string(), "alpha".to_string()]
    }
}

impl Hydrate for Color {
    fn fill_data(&mut self, data: &Document) -> DocumentResult<()> {
        absorb(data, "hue", &mut self.hue)?;
        absorb(data, "alpha", &mut self.alpha)
    }
}

impl FieldAccess for Color {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "hue" => Some(FieldValue::value(self.hue.as_str())),
            "alpha" => Some(FieldValue::value(self.alpha)),
            _ => None,
        }
    }
}

impl SerializationTarget for Color {}

impl Render for Color {
    fn render_display(&self) -> Document {
        FieldSerializer::serialize(SerializationStrategy::Display, self, Some(&Self::fields()))
    }

    fn render_storage(&self) -> Document {
        FieldSerializer::serialize(SerializationStrategy::Storage, self, Some(&Self::fields()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub id: Option<ObjectId>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub password: String,
    pub colors: Vec<Color>,
}

impl User {
    pub fn new(first_name: &str, last_name: &str, email: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            role: "author".to_string(),
            password: "s3cret".to_string(),
            ..Default::default()
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Hydrate for User {
    fn fill_data(&mut self, data: &Document) -> DocumentResult<()> {
        absorb_id(data, &mut self.id);
        absorb(data, "email", &mut self.email)?;
        absorb(data, "firstName", &mut self.first_name)?;
        absorb(data, "lastName", &mut self.last_name)?;
        absorb(data, "role", &mut self.role)?;
        absorb(data, "password", &mut self.password)?;
        absorb_nested_list(data, "colors", &mut self.colors)
    }
}

impl FieldAccess for User {
    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "_id" => Some(FieldValue::value(self.id)),
            "email" => Some(FieldValue::value(self.email.as_str())),
            "firstName" => Some(FieldValue::value(self.first_name.as_str())),
            "lastName" => Some(FieldValue::value(self.last_name.as_str())),
            "role" => Some(FieldValue::value(self.role.as_str())),
            "password" => Some(FieldValue::value(self.password.as_str())),
            "colors" => Some(FieldValue::list(&self.colors)),
            "fullName" => Some(FieldValue::value(self.full_name())),
            _ => None,
        }
    }
}

impl Entity for User {
    fn collection_name() -> &'static str {
        "users"
    }

    fn schema() -> &'static [&'static str] {
        &["_id", "email", "firstName", "lastName", "role", "password", "colors"]
    }

    fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    fn properties_to_exclude(&self) -> Vec<&'static str> {
        vec!["password"]
    }

    fn calculated_properties_to_include(&self) -> Vec<&'static str> {
        vec!["fullName"]
    }

    fn searchable_fields() -> Vec<&'static str> {
        vec!["firstName", "lastName", "email"]
    }
}

pub async fn store() -> DocumentStore<InMemoryProvider> {
    DocumentStore::new(
        InMemoryProvider::builder()
            .connect()
            .await
            .expect("in-memory provider always connects"),
    )
}

/// Saves users named "0" through "count - 1".
pub async fn seed_numbered_users(store: &DocumentStore<InMemoryProvider>, count: usize) -> Vec<User> {
    let mut users = Vec::with_capacity(count);

    for i in 0..count {
        let mut user = User::new(&i.to_string(), "Numbered", &format!("user{i}@example.com"));
        assert!(store.save(&mut user, SaveOptions::default()).await);
        users.push(user);
    }

    users
}

pub fn first_names(page: &Page<User>) -> Vec<&str> {
    page.data.iter().map(|user| user.first_name.as_str()).collect()
}
