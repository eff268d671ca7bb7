use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    Email,
    PasswordHash,
    EmailVerified,
    VerificationCode,
    VerificationCodeExpires,
    FailedLoginAttempts,
    LockedUntil,
    PasswordResetToken,
    PasswordResetExpires,
    PasswordChangeToken,
    PasswordChangeExpires,
    PendingPasswordHash,
    AccountDeletionToken,
    AccountDeletionExpires,
    CreatedAt,
    UpdatedAt,
    LastLogin,
    PasswordChangedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Username)
                            .string_len(50)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Email)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::PasswordHash).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Users::EmailVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Users::VerificationCode).string_len(255).null())
                    .col(ColumnDef::new(Users::VerificationCodeExpires).timestamp().null())
                    .col(
                        ColumnDef::new(Users::FailedLoginAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Users::LockedUntil).timestamp().null())
                    .col(ColumnDef::new(Users::PasswordResetToken).string_len(64).null())
                    .col(ColumnDef::new(Users::PasswordResetExpires).timestamp().null())
                    .col(ColumnDef::new(Users::PasswordChangeToken).string_len(255).null())
                    .col(ColumnDef::new(Users::PasswordChangeExpires).timestamp().null())
                    .col(ColumnDef::new(Users::PendingPasswordHash).string_len(255).null())
                    .col(ColumnDef::new(Users::AccountDeletionToken).string_len(255).null())
                    .col(ColumnDef::new(Users::AccountDeletionExpires).timestamp().null())
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Users::LastLogin).timestamp().null())
                    .col(ColumnDef::new(Users::PasswordChangedAt).timestamp().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}
