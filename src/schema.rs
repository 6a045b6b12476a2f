table! {
    file_tokens (id) {
        id -> Text,
        identifier -> Text,
        file_id -> Text,
        creation_date -> Timestamp,
        valid -> Bool,
        downloads_max -> Integer,
        downloads_total -> Integer,
    }
}

table! {
    files (id) {
        id -> Text,
        name -> Text,
        storage_id -> Text,
        creation_date -> Timestamp,
        size -> BigInt,
        owner_id -> Text,
    }
}

table! {
    roles (id) {
        id -> Text,
        name -> Text,
    }
}

table! {
    users (id) {
        id -> Text,
        login -> Text,
        name -> Nullable<Text>,
        password_hash -> Text,
        email -> Nullable<Text>,
        role_id -> Text,
    }
}

joinable!(file_tokens -> files (file_id));
joinable!(files -> users (owner_id));
joinable!(users -> roles (role_id));

allow_tables_to_appear_in_same_query!(file_tokens, files, roles, users,);
