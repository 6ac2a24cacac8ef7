use sqlx::PgPool;

use crowdnest_common::define_module_client;
use crowdnest_database::init_databases;

use crowdnest_platform::community::{Comment, Follow, Like, Post, PostImage};
use crowdnest_platform::ledger::{Order, Pledge, RefundRequest, Shipment};
use crowdnest_platform::project::{
    Project, ProjectCategory, ProjectComment, ProjectGoal, ProjectImage, ProjectTag, ProjectTagRelation,
    ProjectUpdate,
};
use crowdnest_platform::user::{User, UserAddress};

init_databases!(
    default: [
        User,
        UserAddress,

        ProjectCategory,
        ProjectTag,
        Project,
        ProjectGoal,
        ProjectImage,
        ProjectTagRelation,
        ProjectUpdate,
        ProjectComment,

        Pledge,
        Order,
        RefundRequest,
        Shipment,

        Post,
        PostImage,
        Comment,
        Like,
        Follow
    ]
);

define_module_client! {
    (struct PostgresClient, "postgres")
    client_type: PgPool,
    env: ["DATABASE_URL"],
    setup: async {
        connect(false, true).await.map(|pool| pool.clone())
    }
}

impl PostgresClient {
    pub fn pool(&self) -> PgPool {
        use crowdnest_common::ModuleClient;
        self.get_client().clone()
    }
}
