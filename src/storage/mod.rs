mod comments;
mod habitats;
mod posts;
mod schema;
mod species;
mod types;
mod users;

pub use schema::{Database, IN_MEMORY};
pub use types::{
    Comment, CreateUserError, DatabaseError, FeedItem, Habitat, HabitatRef, HeartState, NewComment,
    NewPost, NewUser, Ownership, PostDetail, PostInputError, PostPatch, Species, User,
    UserInfo, UserInputError,
};
