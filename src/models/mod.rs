pub mod note;
pub mod refresh_token;
pub mod todo;
pub mod user;

pub use note::Entity as Note;
pub use refresh_token::Entity as RefreshToken;
pub use todo::{Entity as Todo, Model as TodoModel};
pub use user::{Entity as User, Model as UserModel};
